//! Preview rasterizer for bare pages.
//!
//! Paints the marks produced by the content interpreter with tiny-skia:
//! paths are filled and stroked, text runs show as x-height bars in their
//! fill color and images as neutral grey boxes. Clipping is not applied.

use crate::content::{self, MarkKind, Segment, XObjects};
use crate::{inherited, PageInfo, PdfEngineError, RgbaImage};
use lopdf::content::Content;
use lopdf::Document;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

const IMAGE_PLACEHOLDER: [u8; 3] = [190, 190, 190];

pub(crate) fn render_page(
    doc: &Document,
    page: &PageInfo,
    scale: f32,
) -> Result<RgbaImage, PdfEngineError> {
    let size = page.media_box.size();
    let width = (size.width_pt * scale).round().max(1.0) as u32;
    let height = (size.height_pt * scale).round().max(1.0) as u32;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| PdfEngineError::Backend(format!("cannot allocate {width}x{height} page")))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let bytes = doc.get_page_content(page.id)?;
    let content = Content::decode(&bytes)?;
    let xobjects = XObjects::from_resources(doc, inherited(doc, page.id, b"Resources"));
    let marks = content::interpret(&content.operations, &xobjects);

    // User space (y up, MediaBox origin) to device pixels (y down).
    let media = page.media_box;
    let transform = Transform::from_row(scale, 0.0, 0.0, -scale, -media.x0 * scale, media.y1 * scale);

    for mark in &marks {
        let Some(path) = build_path(&mark.outline) else {
            continue;
        };
        match mark.kind {
            MarkKind::Fill | MarkKind::Text => fill(&mut pixmap, &path, mark.fill, mark.even_odd, transform),
            MarkKind::Stroke => stroke(&mut pixmap, &path, mark.stroke, mark.line_width, transform),
            MarkKind::FillStroke => {
                fill(&mut pixmap, &path, mark.fill, mark.even_odd, transform);
                stroke(&mut pixmap, &path, mark.stroke, mark.line_width, transform);
            }
            MarkKind::Image | MarkKind::Form => {
                fill(&mut pixmap, &path, IMAGE_PLACEHOLDER, false, transform)
            }
            MarkKind::Clip => {}
        }
    }

    Ok(pixmap_to_rgba(&pixmap))
}

fn build_path(outline: &[Segment]) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for segment in outline {
        match *segment {
            Segment::MoveTo(x, y) => builder.move_to(x, y),
            Segment::LineTo(x, y) => builder.line_to(x, y),
            Segment::CubicTo(a, b, c, d, e, f) => builder.cubic_to(a, b, c, d, e, f),
            Segment::Close => builder.close(),
        }
    }
    builder.finish()
}

fn paint(rgb: [u8; 3]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgb[0], rgb[1], rgb[2], 255);
    paint.anti_alias = true;
    paint
}

fn fill(pixmap: &mut Pixmap, path: &tiny_skia::Path, rgb: [u8; 3], even_odd: bool, transform: Transform) {
    let rule = if even_odd { FillRule::EvenOdd } else { FillRule::Winding };
    pixmap.fill_path(path, &paint(rgb), rule, transform, None);
}

fn stroke(pixmap: &mut Pixmap, path: &tiny_skia::Path, rgb: [u8; 3], width: f32, transform: Transform) {
    // Zero-width strokes are hairlines in PDF.
    let stroke = Stroke { width: width.max(0.0), ..Stroke::default() };
    pixmap.stroke_path(path, &paint(rgb), &stroke, transform, None);
}

/// Copies a premultiplied pixmap into a straight-alpha RGBA image.
pub(crate) fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (target, source) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = source.demultiply();
        *target = image::Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}
