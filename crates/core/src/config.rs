//! Editor settings
//!
//! Missing fields fall back to their defaults when deserializing, so older
//! config files keep loading after new settings are added.

use crate::annotation::{Color, StrokeStyle};
use crate::compose::ComposeStyle;
use crate::interaction::InteractionConfig;
use serde::{Deserialize, Serialize};

/// Defaults applied to new text annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    pub font_family: String,
    /// Upper bound for the fitted size, in points
    pub font_size: f32,
    pub bold: bool,
    /// 0 draws white, 100 draws black
    pub density: u8,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self { font_family: "gothic".to_owned(), font_size: 100.0, bold: false, density: 100 }
    }
}

impl TextSettings {
    pub fn color(&self) -> Color {
        Color::from_density(self.density)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub initial_zoom: f32,
    /// Composited pages kept in memory
    pub cache_capacity: usize,
    pub undo_depth: usize,
    /// Resize handle half-size in device pixels
    pub handle_size: f32,
    /// Smallest accepted drawing gesture in device pixels
    pub min_gesture_size: f32,
    pub hit_tolerance: f32,
    /// Offset of duplicates and pastes in device pixels
    pub duplicate_offset: f32,
    pub redaction_fill: Color,
    pub stroke: StrokeStyle,
    pub text: TextSettings,
    /// Pixels per point used when rasterizing shapes and text for export
    pub export_raster_scale: f32,
    /// Initial size of inserted images relative to their pixel size
    pub image_scale: f32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            initial_zoom: 0.8,
            cache_capacity: 5,
            undo_depth: 20,
            handle_size: 10.0,
            min_gesture_size: 5.0,
            hit_tolerance: 1.0,
            duplicate_offset: 10.0,
            redaction_fill: Color::LIGHT_GREY,
            stroke: StrokeStyle::default(),
            text: TextSettings::default(),
            export_raster_scale: 2.0,
            image_scale: 0.3,
        }
    }
}

impl EditorConfig {
    pub fn interaction(&self) -> InteractionConfig {
        InteractionConfig {
            handle_size: self.handle_size,
            min_gesture_size: self.min_gesture_size,
            hit_tolerance: self.hit_tolerance,
        }
    }

    pub fn compose_style(&self) -> ComposeStyle {
        ComposeStyle { redaction_fill: self.redaction_fill }
    }
}
