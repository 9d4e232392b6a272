//! Baking annotations into a new PDF
//!
//! Each page is processed in painting order. Redactions go first as a single
//! batch, so removed content cannot reappear beneath a later overlay.
//! The whole document is built in memory; an error leaves nothing behind.

use crate::annotation::{AnnotationBody, AnnotationKind, AnnotationStore, Color};
use crate::compose::{image_tile, shape_tile, text_tile, Tile};
use crate::error::EditorResult;
use crate::text::TextEngine;
use pagemark_engine::{DocumentEngine, DocumentHandle, DocumentWriter, PageRect, Rotation};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Pixels per point for shape and text tiles
    pub raster_scale: f32,
    pub redaction_fill: Color,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { raster_scale: 2.0, redaction_fill: Color::LIGHT_GREY }
    }
}

/// Counters reported after an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub pages: u32,
    pub removed_items: usize,
    pub overlays: usize,
    pub skipped: usize,
}

pub fn export<E: DocumentEngine, T: TextEngine + ?Sized>(
    engine: &E,
    handle: DocumentHandle,
    store: &AnnotationStore,
    rotations: &BTreeMap<u32, Rotation>,
    text: &mut T,
    options: &ExportOptions,
) -> EditorResult<(Vec<u8>, ExportSummary)> {
    let mut writer = engine.writer(handle)?;
    let mut summary = ExportSummary { pages: writer.page_count(), ..ExportSummary::default() };
    let scale = options.raster_scale.max(0.1);

    for page_index in 0..writer.page_count() {
        if let Some(rotation) = rotations.get(&page_index) {
            writer.set_rotation(page_index, *rotation)?;
        }

        let annotations = store.render_order(page_index);
        let redactions: Vec<PageRect> = annotations
            .iter()
            .filter(|annotation| annotation.kind() == AnnotationKind::Redaction)
            .map(|annotation| annotation.bounds().into())
            .collect();
        if !redactions.is_empty() {
            summary.removed_items +=
                writer.apply_redactions(page_index, &redactions, options.redaction_fill.to_rgb())?;
        }

        for annotation in annotations {
            let bounds = annotation.bounds();
            let tile = match annotation.body() {
                AnnotationBody::Redaction => continue,
                AnnotationBody::MaskBlack | AnnotationBody::MaskWhite => {
                    let fill = if annotation.kind() == AnnotationKind::MaskBlack {
                        Color::BLACK
                    } else {
                        Color::WHITE
                    };
                    writer.fill_rect(page_index, bounds.into(), fill.to_rgb())?;
                    summary.overlays += 1;
                    continue;
                }
                AnnotationBody::ImageObject(data) => match image_tile(data, bounds, scale) {
                    Ok(tile) => tile,
                    Err(err) => {
                        log::warn!("export skipped image annotation {}: {err}", annotation.id());
                        summary.skipped += 1;
                        continue;
                    }
                },
                AnnotationBody::Frame(shape) | AnnotationBody::Shape(shape) => {
                    shape_tile(shape, bounds, scale)
                }
                AnnotationBody::TextImage(data) => text_tile(text, data, bounds, scale),
            };

            match tile {
                Some(tile) => {
                    embed(&mut writer, page_index, &tile, scale)?;
                    summary.overlays += 1;
                }
                None => summary.skipped += 1,
            }
        }
    }

    let bytes = writer.serialize()?;
    log::info!(
        "exported {} page(s): {} item(s) redacted, {} overlay(s), {} skipped, {} bytes",
        summary.pages,
        summary.removed_items,
        summary.overlays,
        summary.skipped,
        bytes.len()
    );
    Ok((bytes, summary))
}

fn embed<W: DocumentWriter>(writer: &mut W, page_index: u32, tile: &Tile, scale: f32) -> EditorResult<()> {
    writer.insert_image(page_index, tile.document_rect(scale).into(), &tile.image)?;
    Ok(())
}
