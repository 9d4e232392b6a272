//! Compositing annotations onto a rasterized page
//!
//! Everything here works in device pixels at a given scale. Shapes, text and
//! images are first drawn into a [`Tile`]; the same tiles are embedded by the
//! export pipeline, which keeps preview and export visually aligned.

use crate::annotation::{Annotation, AnnotationBody, Color, ImageData, ShapeData, ShapeGeometry, TextData};
use crate::geometry::Rect;
use crate::text::{fit_font_size, FontRequest, TextEngine};
use image::imageops::{self, FilterType};
use image::Rgba;
use pagemark_engine::RgbaImage;
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Colors that are not carried by the annotations themselves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposeStyle {
    pub redaction_fill: Color,
}

impl Default for ComposeStyle {
    fn default() -> Self {
        Self { redaction_fill: Color::LIGHT_GREY }
    }
}

/// Bitmap positioned in device space
#[derive(Debug, Clone)]
pub struct Tile {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

impl Tile {
    /// Document-space rectangle covered by the tile when drawn at `scale`
    pub fn document_rect(&self, scale: f32) -> Rect {
        let x0 = self.x as f32;
        let y0 = self.y as f32;
        Rect::new(x0, y0, x0 + self.image.width() as f32, y0 + self.image.height() as f32)
            .to_document(scale)
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

/// Paint `annotations` (already in painting order) onto `target`
pub fn compose_page<T: TextEngine + ?Sized>(
    target: &mut RgbaImage,
    annotations: &[&Annotation],
    zoom: f32,
    text: &mut T,
    style: &ComposeStyle,
) {
    for annotation in annotations {
        let bounds = annotation.bounds();
        let tile = match annotation.body() {
            AnnotationBody::Redaction => {
                fill_rect(target, bounds.to_device(zoom), style.redaction_fill);
                None
            }
            AnnotationBody::MaskBlack => {
                fill_rect(target, bounds.to_device(zoom), Color::BLACK);
                None
            }
            AnnotationBody::MaskWhite => {
                fill_rect(target, bounds.to_device(zoom), Color::WHITE);
                None
            }
            AnnotationBody::Frame(shape) | AnnotationBody::Shape(shape) => {
                shape_tile(shape, bounds, zoom)
            }
            AnnotationBody::TextImage(data) => text_tile(text, data, bounds, zoom),
            AnnotationBody::ImageObject(data) => match image_tile(data, bounds, zoom) {
                Ok(tile) => tile,
                Err(err) => {
                    log::warn!("skipping image annotation {}: {err}", annotation.id());
                    None
                }
            },
        };

        if let Some(tile) = tile {
            imageops::overlay(target, &tile.image, tile.x, tile.y);
        }
    }
}

/// Opaque fill of a device rect, clipped to the image
pub fn fill_rect(target: &mut RgbaImage, rect: Rect, color: Color) {
    let clamp_x = |value: f32| value.round().clamp(0.0, target.width() as f32) as u32;
    let clamp_y = |value: f32| value.round().clamp(0.0, target.height() as f32) as u32;
    let (x0, x1) = (clamp_x(rect.x0), clamp_x(rect.x1));
    let (y0, y1) = (clamp_y(rect.y0), clamp_y(rect.y1));
    let pixel = Rgba([color.r, color.g, color.b, 255]);

    for y in y0..y1 {
        for x in x0..x1 {
            target.put_pixel(x, y, pixel);
        }
    }
}

/// Stroke-only rendering of a shape on a transparent tile padded by the stroke width
pub fn shape_tile(shape: &ShapeData, bounds: Rect, scale: f32) -> Option<Tile> {
    let stroke_width = (shape.stroke.width * scale).round().max(1.0);
    let device = bounds.to_device(scale);
    let origin_x = (device.x0 - stroke_width).floor();
    let origin_y = (device.y0 - stroke_width).floor();
    let width = (device.width() + 2.0 * stroke_width).ceil() as u32 + 1;
    let height = (device.height() + 2.0 * stroke_width).ceil() as u32 + 1;
    let mut pixmap = Pixmap::new(width, height)?;

    let local = |x: f32, y: f32| (x * scale - origin_x, y * scale - origin_y);
    let (left, top) = local(bounds.x0, bounds.y0);
    let (right, bottom) = local(bounds.x1, bounds.y1);

    let path = match &shape.geometry {
        ShapeGeometry::Rectangle => {
            let rect = tiny_skia::Rect::from_ltrb(left, top, right, bottom)?;
            PathBuilder::from_rect(rect)
        }
        ShapeGeometry::Oval => {
            let rect = tiny_skia::Rect::from_ltrb(left, top, right, bottom)?;
            PathBuilder::from_oval(rect)?
        }
        ShapeGeometry::Line { start, end } => {
            let mut builder = PathBuilder::new();
            let (x, y) = local(start.x, start.y);
            builder.move_to(x, y);
            let (x, y) = local(end.x, end.y);
            builder.line_to(x, y);
            builder.finish()?
        }
        ShapeGeometry::Freehand { points } => {
            let (first, rest) = points.split_first()?;
            let mut builder = PathBuilder::new();
            let (x, y) = local(first.x, first.y);
            builder.move_to(x, y);
            for point in rest {
                let (x, y) = local(point.x, point.y);
                builder.line_to(x, y);
            }
            builder.finish()?
        }
    };

    let color = shape.stroke.color;
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;

    let mut stroke = Stroke { width: stroke_width, ..Stroke::default() };
    if matches!(shape.geometry, ShapeGeometry::Freehand { .. } | ShapeGeometry::Line { .. }) {
        stroke.line_cap = LineCap::Round;
        stroke.line_join = LineJoin::Round;
    }
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);

    Some(Tile { image: pixmap_to_rgba(&pixmap), x: origin_x as i64, y: origin_y as i64 })
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (target, source) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = source.demultiply();
        *target = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}

/// Fitted text, left aligned and vertically centered in the bounds
pub fn text_tile<T: TextEngine + ?Sized>(
    engine: &mut T,
    data: &TextData,
    bounds: Rect,
    scale: f32,
) -> Option<Tile> {
    let device = bounds.to_device(scale);
    let font = FontRequest::new(data.font_family.as_str(), data.bold);
    let max_size = (data.font_size * scale).floor().max(0.0) as u32;
    let size = fit_font_size(engine, &data.text, &font, device.width(), device.height(), max_size);
    if size == 0 {
        return None;
    }

    let image = engine.rasterize(&data.text, &font, size as f32, data.color);
    let y = device.y0 + (device.height() - image.height() as f32) / 2.0;
    let tile = Tile { image, x: device.x0.round() as i64, y: y.round() as i64 };
    (!tile.is_empty()).then_some(tile)
}

/// Decoded image shrunk to fit the bounds, anchored top-left
pub fn image_tile(data: &ImageData, bounds: Rect, scale: f32) -> Result<Option<Tile>, image::ImageError> {
    let decoded = image::load_from_memory(&data.bytes)?.to_rgba8();
    let device = bounds.to_device(scale);
    let image = shrink_to_fit(decoded, device.width(), device.height());

    let tile = Tile { image, x: device.x0.round() as i64, y: device.y0.round() as i64 };
    Ok((!tile.is_empty()).then_some(tile))
}

/// Aspect-preserving downscale so the image fits `max_width x max_height`
///
/// Images that already fit are returned untouched.
pub fn shrink_to_fit(image: RgbaImage, max_width: f32, max_height: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image;
    }
    if width as f32 <= max_width && height as f32 <= max_height {
        return image;
    }

    let ratio = (max_width / width as f32).min(max_height / height as f32).max(0.0);
    let new_width = (width as f32 * ratio).floor().max(1.0) as u32;
    let new_height = (height as f32 * ratio).floor().max(1.0) as u32;
    imageops::resize(&image, new_width, new_height, FilterType::Lanczos3)
}
