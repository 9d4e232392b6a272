//! Text measurement and rasterization for text annotations
//!
//! [`SystemTextEngine`] draws with installed fonts. [`BlockTextEngine`] is a
//! deterministic face used when no usable font exists and in tests.

use crate::annotation::Color;
use ab_glyph::{point, Font, FontArc, Glyph, GlyphId, PxScale, ScaleFont};
use image::Rgba;
use pagemark_engine::RgbaImage;
use std::collections::HashMap;

/// Font selection for one text annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontRequest {
    pub family: String,
    pub bold: bool,
}

impl FontRequest {
    pub fn new(family: impl Into<String>, bold: bool) -> Self {
        Self { family: family.into(), bold }
    }
}

/// Tight ink box of a laid out string, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

impl TextExtent {
    pub fn fits(&self, width: f32, height: f32) -> bool {
        self.width <= width && self.height <= height
    }
}

/// Measures and rasterizes strings
pub trait TextEngine {
    fn measure(&mut self, text: &str, font: &FontRequest, size: f32) -> TextExtent;

    /// Image covering exactly the ink box reported by [`TextEngine::measure`]
    fn rasterize(&mut self, text: &str, font: &FontRequest, size: f32, color: Color) -> RgbaImage;
}

/// Platform family names tried for a requested family, in order
pub fn family_candidates(family: &str) -> Vec<&str> {
    let aliases: &[&str] = match family.to_ascii_lowercase().as_str() {
        "gothic" => &["Yu Gothic", "MS Gothic", "Hiragino Sans", "Noto Sans CJK JP", "DejaVu Sans"],
        "mincho" => &["Yu Mincho", "MS Mincho", "Hiragino Mincho ProN", "Noto Serif CJK JP", "DejaVu Serif"],
        "msgothic" => &["MS Gothic", "Noto Sans CJK JP"],
        "msmincho" => &["MS Mincho", "Noto Serif CJK JP"],
        "meiryo_ui" => &["Meiryo UI", "Meiryo", "Noto Sans CJK JP"],
        "yu_gothic_ui" => &["Yu Gothic UI", "Yu Gothic", "Noto Sans CJK JP"],
        _ => &[],
    };
    if aliases.is_empty() {
        vec![family]
    } else {
        aliases.to_vec()
    }
}

/// Largest integer size in `1..=max_size` whose ink box fits `width x height`
///
/// Returns 0 for blank text or a non-positive box and 1 when nothing fits.
pub fn fit_font_size<T: TextEngine + ?Sized>(
    engine: &mut T,
    text: &str,
    font: &FontRequest,
    width: f32,
    height: f32,
    max_size: u32,
) -> u32 {
    if text.trim().is_empty() || width <= 0.0 || height <= 0.0 {
        return 0;
    }

    let (mut low, mut high) = (1, max_size.max(1));
    let mut best = 1;
    while low <= high {
        let mid = low + (high - low) / 2;
        if engine.measure(text, font, mid as f32).fits(width, height) {
            best = mid;
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    best
}

fn blend(image: &mut RgbaImage, x: i64, y: i64, color: Color, coverage: f32) {
    if x < 0 || y < 0 || x >= i64::from(image.width()) || y >= i64::from(image.height()) {
        return;
    }
    let alpha = (coverage.clamp(0.0, 1.0) * f32::from(color.a)).round() as u8;
    let pixel = image.get_pixel_mut(x as u32, y as u32);
    if alpha > pixel[3] {
        *pixel = Rgba([color.r, color.g, color.b, alpha]);
    }
}

/// Deterministic face: every visible character is a solid box
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTextEngine;

impl BlockTextEngine {
    const ADVANCE: f32 = 0.6;
    const SPACE_ADVANCE: f32 = 0.3;
    const GLYPH_WIDTH: f32 = 0.5;
    const GLYPH_HEIGHT: f32 = 0.7;
    const LINE_HEIGHT: f32 = 1.2;

    /// Glyph boxes `(x0, y0, x1, y1)` relative to the first line's top
    fn glyph_boxes(text: &str, size: f32) -> Vec<(f32, f32, f32, f32)> {
        let mut boxes = Vec::new();
        for (line_index, line) in text.split('\n').enumerate() {
            let top = line_index as f32 * Self::LINE_HEIGHT * size;
            let mut cursor = 0.0;
            for ch in line.chars() {
                if ch.is_whitespace() {
                    cursor += Self::SPACE_ADVANCE * size;
                    continue;
                }
                boxes.push((cursor, top, cursor + Self::GLYPH_WIDTH * size, top + Self::GLYPH_HEIGHT * size));
                cursor += Self::ADVANCE * size;
            }
        }
        boxes
    }

    fn ink_box(boxes: &[(f32, f32, f32, f32)]) -> Option<(f32, f32, f32, f32)> {
        boxes.iter().copied().reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)))
    }
}

impl TextEngine for BlockTextEngine {
    fn measure(&mut self, text: &str, _font: &FontRequest, size: f32) -> TextExtent {
        match Self::ink_box(&Self::glyph_boxes(text, size)) {
            Some((x0, y0, x1, y1)) => TextExtent { width: x1 - x0, height: y1 - y0 },
            None => TextExtent::default(),
        }
    }

    fn rasterize(&mut self, text: &str, font: &FontRequest, size: f32, color: Color) -> RgbaImage {
        let extent = self.measure(text, font, size);
        let mut image =
            RgbaImage::new(extent.width.ceil() as u32, extent.height.ceil() as u32);
        let boxes = Self::glyph_boxes(text, size);
        let Some((left, top, _, _)) = Self::ink_box(&boxes) else {
            return image;
        };

        for (x0, y0, x1, y1) in boxes {
            let (x0, y0) = ((x0 - left).floor() as i64, (y0 - top).floor() as i64);
            let (x1, y1) = ((x1 - left).ceil() as i64, (y1 - top).ceil() as i64);
            for y in y0..y1 {
                for x in x0..x1 {
                    blend(&mut image, x, y, color, 1.0);
                }
            }
        }
        image
    }
}

/// Text engine backed by system fonts
pub struct SystemTextEngine {
    fonts: HashMap<FontRequest, Option<FontArc>>,
    fallback: BlockTextEngine,
}

impl Default for SystemTextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemTextEngine {
    pub fn new() -> Self {
        Self { fonts: HashMap::new(), fallback: BlockTextEngine }
    }

    fn font(&mut self, request: &FontRequest) -> Option<FontArc> {
        if let Some(cached) = self.fonts.get(request) {
            return cached.clone();
        }
        let loaded = load_system_font(request);
        if loaded.is_none() {
            log::warn!("no usable font for family {:?}, using block glyphs", request.family);
        }
        self.fonts.insert(request.clone(), loaded.clone());
        loaded
    }
}

fn load_system_font(request: &FontRequest) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut properties = Properties::new();
    if request.bold {
        properties.weight = Weight::BOLD;
    }

    let mut families: Vec<FamilyName> = family_candidates(&request.family)
        .into_iter()
        .map(|name| FamilyName::Title(name.to_owned()))
        .collect();
    families.push(FamilyName::SansSerif);

    let source = SystemSource::new();
    for family in families {
        let Ok(handle) = source.select_best_match(std::slice::from_ref(&family), &properties) else {
            continue;
        };
        let Ok(font) = handle.load() else {
            continue;
        };
        let Some(data) = font.copy_font_data() else {
            continue;
        };
        if let Ok(font) = FontArc::try_from_vec((*data).clone()) {
            log::debug!("loaded font {} for {:?}", font_name(&family), request.family);
            return Some(font);
        }
    }
    None
}

fn font_name(family: &font_kit::family_name::FamilyName) -> String {
    match family {
        font_kit::family_name::FamilyName::Title(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

/// Positioned glyphs of possibly multi-line text, baseline of line one at ascent
fn layout(font: &FontArc, text: &str, size: f32) -> Vec<Glyph> {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::new();

    for (line_index, line) in text.split('\n').enumerate() {
        let baseline = scaled.ascent() + line_index as f32 * (scaled.height() + scaled.line_gap());
        let mut cursor = 0.0f32;
        let mut previous: Option<GlyphId> = None;
        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if let Some(previous) = previous {
                cursor += scaled.kern(previous, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(cursor, baseline)));
            cursor += scaled.h_advance(id);
            previous = Some(id);
        }
    }
    glyphs
}

/// Pixel bounds of every outlined glyph, `None` when nothing has ink
fn ink_bounds(font: &FontArc, glyphs: &[Glyph]) -> Option<ab_glyph::Rect> {
    glyphs
        .iter()
        .filter_map(|glyph| font.outline_glyph(glyph.clone()))
        .map(|outlined| outlined.px_bounds())
        .reduce(|a, b| ab_glyph::Rect {
            min: point(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
            max: point(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
        })
}

impl TextEngine for SystemTextEngine {
    fn measure(&mut self, text: &str, font: &FontRequest, size: f32) -> TextExtent {
        let Some(face) = self.font(font) else {
            return self.fallback.measure(text, font, size);
        };
        match ink_bounds(&face, &layout(&face, text, size)) {
            Some(bounds) => TextExtent { width: bounds.width(), height: bounds.height() },
            None => TextExtent::default(),
        }
    }

    fn rasterize(&mut self, text: &str, font: &FontRequest, size: f32, color: Color) -> RgbaImage {
        let Some(face) = self.font(font) else {
            return self.fallback.rasterize(text, font, size, color);
        };
        let glyphs = layout(&face, text, size);
        let Some(bounds) = ink_bounds(&face, &glyphs) else {
            return RgbaImage::new(0, 0);
        };

        let mut image = RgbaImage::new(bounds.width().ceil() as u32, bounds.height().ceil() as u32);
        for glyph in glyphs {
            let Some(outlined) = face.outline_glyph(glyph) else {
                continue;
            };
            let glyph_bounds = outlined.px_bounds();
            let offset_x = (glyph_bounds.min.x - bounds.min.x).round() as i64;
            let offset_y = (glyph_bounds.min.y - bounds.min.y).round() as i64;
            outlined.draw(|x, y, coverage| {
                blend(&mut image, offset_x + i64::from(x), offset_y + i64::from(y), color, coverage);
            });
        }
        image
    }
}
