//! Render pipeline: rasterize, composite, rotate, cache
//!
//! Composites are cached per `(page, zoom, rotation)`. Pages touched by an
//! edit are marked dirty and recomposed on their next render.

use crate::annotation::AnnotationStore;
use crate::compose::{compose_page, ComposeStyle};
use crate::geometry::Point;
use crate::text::TextEngine;
use image::imageops;
use pagemark_cache::{CacheStats, PageRenderCache, RenderKey};
use pagemark_engine::{
    DocumentEngine, DocumentHandle, PdfEngineError, RenderRequest, RgbaImage, Rotation,
};
use std::sync::Arc;

/// Turn an unrotated composite clockwise by `rotation`
pub fn rotate_image(image: RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    }
}

/// Map a point on the rotated display back to unrotated device space
///
/// `width` and `height` are the unrotated device dimensions of the page.
pub fn display_to_page_device(point: Point, rotation: Rotation, width: f32, height: f32) -> Point {
    match rotation {
        Rotation::Deg0 => point,
        Rotation::Deg90 => Point::new(point.y, height - point.x),
        Rotation::Deg180 => Point::new(width - point.x, height - point.y),
        Rotation::Deg270 => Point::new(width - point.y, point.x),
    }
}

/// Inverse of [`display_to_page_device`]
pub fn page_device_to_display(point: Point, rotation: Rotation, width: f32, height: f32) -> Point {
    match rotation {
        Rotation::Deg0 => point,
        Rotation::Deg90 => Point::new(height - point.y, point.x),
        Rotation::Deg180 => Point::new(width - point.x, height - point.y),
        Rotation::Deg270 => Point::new(point.y, width - point.x),
    }
}

/// Everything needed to composite one page
pub struct RenderContext<'a, E: DocumentEngine, T: TextEngine + ?Sized> {
    pub engine: &'a E,
    pub handle: DocumentHandle,
    pub store: &'a AnnotationStore,
    pub text: &'a mut T,
}

#[derive(Debug)]
pub struct RenderPipeline {
    cache: PageRenderCache<Arc<RgbaImage>>,
    style: ComposeStyle,
}

impl RenderPipeline {
    pub fn new(capacity: usize, style: ComposeStyle) -> Self {
        Self { cache: PageRenderCache::new(capacity), style }
    }

    /// Composited page at `zoom`, turned by `rotation`
    pub fn render<E: DocumentEngine, T: TextEngine + ?Sized>(
        &mut self,
        context: RenderContext<'_, E, T>,
        page_index: u32,
        zoom: f32,
        rotation: Rotation,
    ) -> Result<Arc<RgbaImage>, PdfEngineError> {
        let key = RenderKey::new(page_index, zoom, rotation.degrees());
        if let Some(cached) = self.cache.lookup(&key) {
            return Ok(cached);
        }

        let mut image =
            context.engine.render_page(context.handle, RenderRequest { page_index, scale: zoom })?;
        let annotations = context.store.render_order(page_index);
        compose_page(&mut image, &annotations, zoom, context.text, &self.style);
        log::debug!(
            "composed page {page_index} with {} annotation(s) at zoom {zoom}",
            annotations.len()
        );

        let composite = Arc::new(rotate_image(image, rotation));
        self.cache.store(key, Arc::clone(&composite));
        Ok(composite)
    }

    pub fn mark_dirty(&mut self, page_index: u32) {
        self.cache.mark_dirty(page_index);
    }

    pub fn mark_all_dirty(&mut self) {
        self.cache.mark_all_dirty();
    }

    pub fn is_dirty(&self, page_index: u32) -> bool {
        self.cache.is_dirty(page_index)
    }

    /// Drop every cached composite
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Swap compose colors, dropping composites drawn with the old ones
    pub fn set_style(&mut self, style: ComposeStyle) {
        if style != self.style {
            self.style = style;
            self.cache.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, AnnotationBody};
    use crate::geometry::Rect;
    use crate::text::BlockTextEngine;
    use pagemark_engine::sample::SampleDocument;
    use pagemark_engine::{LopdfEngine, OpenSource};

    fn open(bytes: Vec<u8>) -> (LopdfEngine, DocumentHandle) {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(bytes)).expect("open");
        (engine, handle)
    }

    #[test]
    fn test_display_mapping_round_trips() {
        let point = Point::new(12.0, 30.0);
        for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            let display = page_device_to_display(point, rotation, 200.0, 100.0);
            assert_eq!(display_to_page_device(display, rotation, 200.0, 100.0), point);
        }
    }

    #[test]
    fn test_display_mapping_quarter_turn() {
        // Top-left of the unrotated page ends up at the top-right after 90 degrees
        let display = page_device_to_display(Point::new(0.0, 0.0), Rotation::Deg90, 200.0, 100.0);
        assert_eq!(display, Point::new(100.0, 0.0));
    }

    #[test]
    fn test_render_hits_cache_until_dirty() {
        let bytes = SampleDocument::new().page(100.0, 80.0).build().expect("sample");
        let (engine, handle) = open(bytes);
        let mut store = AnnotationStore::new();
        let mut pipeline = RenderPipeline::new(5, ComposeStyle::default());
        let mut text = BlockTextEngine;

        let first = pipeline
            .render(RenderContext { engine: &engine, handle, store: &store, text: &mut text }, 0, 1.0, Rotation::Deg0)
            .expect("render");
        let second = pipeline
            .render(RenderContext { engine: &engine, handle, store: &store, text: &mut text }, 0, 1.0, Rotation::Deg0)
            .expect("render");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pipeline.stats().hits, 1);

        store.insert(Annotation::new(0, Rect::new(10.0, 10.0, 20.0, 20.0), AnnotationBody::MaskBlack));
        pipeline.mark_dirty(0);
        let third = pipeline
            .render(RenderContext { engine: &engine, handle, store: &store, text: &mut text }, 0, 1.0, Rotation::Deg0)
            .expect("render");
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.get_pixel(15, 15)[0], 0);
        assert_eq!(third.get_pixel(50, 50)[0], 255);
        assert!(!pipeline.is_dirty(0));
    }

    #[test]
    fn test_rotation_turns_composite() {
        let bytes = SampleDocument::new().page(100.0, 50.0).build().expect("sample");
        let (engine, handle) = open(bytes);
        let mut store = AnnotationStore::new();
        store.insert(Annotation::new(0, Rect::new(0.0, 0.0, 10.0, 10.0), AnnotationBody::MaskBlack));
        let mut pipeline = RenderPipeline::new(5, ComposeStyle::default());

        let image = pipeline
            .render(
                RenderContext { engine: &engine, handle, store: &store, text: &mut BlockTextEngine },
                0,
                1.0,
                Rotation::Deg90,
            )
            .expect("render");
        assert_eq!(image.dimensions(), (50, 100));
        // The mask moved from the top-left corner to the top-right corner
        assert_eq!(image.get_pixel(45, 5)[0], 0);
        assert_eq!(image.get_pixel(5, 5)[0], 255);
    }
}
