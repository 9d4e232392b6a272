//! Document engine used by the editor core.
//!
//! The engine owns parsed documents behind opaque handles, reports page
//! geometry, rasterizes bare pages for preview and hands out writers that
//! bake edits (redactions, fills, images) into a copy of the document.
//!
//! Page-space rectangles ([`PageRect`]) use the editor convention: points,
//! origin at the top-left corner of the *unrotated* page, y growing downward.
//! Conversion to PDF user space happens inside the engine.

mod assemble;
mod content;
mod raster;
pub mod sample;
mod writer;

use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use assemble::{merge, split};
pub use writer::LopdfWriter;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Default page size (US Letter) used when a page carries no usable MediaBox.
const FALLBACK_MEDIA_BOX: MediaBox = MediaBox { x0: 0.0, y0: 0.0, x1: 612.0, y1: 792.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Unrotated page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Clockwise page rotation, as stored in a page's `/Rotate` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Normalizes any multiple of 90 (negative values included).
    /// Returns `None` for angles that are not a quarter turn.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// The next quarter turn clockwise.
    pub fn clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    /// Whether the displayed page swaps width and height.
    pub fn is_sideways(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Rectangle in top-left unrotated page space, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0: x0.min(x1), y0: y0.min(y1), x1: x0.max(x1), y1: y0.max(y1) }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Document collaborator consumed by the editor.
pub trait DocumentEngine {
    type Writer: DocumentWriter;

    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSize, PdfEngineError>;
    fn rotation(&self, handle: DocumentHandle, page_index: u32)
        -> Result<Rotation, PdfEngineError>;
    fn set_rotation(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        rotation: Rotation,
    ) -> Result<(), PdfEngineError>;
    /// Rasterizes the bare page, always unrotated, at `request.scale` pixels per point.
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    /// Copy of the document that edits can be written into.
    fn writer(&self, handle: DocumentHandle) -> Result<Self::Writer, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

/// Mutable copy of a document used to bake edits and serialize the result.
pub trait DocumentWriter {
    fn page_count(&self) -> u32;
    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError>;
    fn set_rotation(&mut self, page_index: u32, rotation: Rotation) -> Result<(), PdfEngineError>;
    /// Removes every content item intersecting any of `rects`, then paints
    /// each rect with `fill`. Returns the number of removed content items.
    fn apply_redactions(
        &mut self,
        page_index: u32,
        rects: &[PageRect],
        fill: [u8; 3],
    ) -> Result<usize, PdfEngineError>;
    fn fill_rect(
        &mut self,
        page_index: u32,
        rect: PageRect,
        fill: [u8; 3],
    ) -> Result<(), PdfEngineError>;
    /// Embeds `image` (alpha preserved) stretched over `rect`.
    fn insert_image(
        &mut self,
        page_index: u32,
        rect: PageRect,
        image: &RgbaImage,
    ) -> Result<(), PdfEngineError>;
    fn serialize(self) -> Result<Vec<u8>, PdfEngineError>;
}

/// MediaBox in PDF user space, normalized so `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl MediaBox {
    pub fn size(&self) -> PageSize {
        PageSize { width_pt: self.x1 - self.x0, height_pt: self.y1 - self.y0 }
    }

    /// Converts a top-left page rect into PDF user space `(x, y, w, h)`.
    pub fn to_user(&self, rect: PageRect) -> (f32, f32, f32, f32) {
        (self.x0 + rect.x0, self.y1 - rect.y1, rect.width(), rect.height())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PageInfo {
    pub id: ObjectId,
    pub media_box: MediaBox,
    pub rotation: Rotation,
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    doc: Document,
    pages: Vec<PageInfo>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn record_mut(&mut self, handle: DocumentHandle) -> Result<&mut DocumentRecord, PdfEngineError> {
        self.docs.get_mut(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl DocumentRecord {
    fn page(&self, page_index: u32) -> Result<&PageInfo, PdfEngineError> {
        page_at(&self.pages, page_index)
    }
}

pub(crate) fn page_at(pages: &[PageInfo], page_index: u32) -> Result<&PageInfo, PdfEngineError> {
    pages.get(page_index as usize).ok_or(PdfEngineError::PageOutOfRange {
        page: page_index,
        page_count: pages.len() as u32,
    })
}

pub(crate) fn load_document(bytes: &[u8]) -> Result<Document, PdfEngineError> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }
    Ok(Document::load_mem(bytes)?)
}

/// Collects page geometry in document order.
pub(crate) fn read_pages(doc: &Document) -> Result<Vec<PageInfo>, PdfEngineError> {
    let pages = doc.get_pages();
    let mut infos = Vec::with_capacity(pages.len());

    for (_, id) in pages {
        let media_box = inherited(doc, id, b"MediaBox")
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| parse_media_box(doc, array))
            .unwrap_or(FALLBACK_MEDIA_BOX);
        let rotation = inherited(doc, id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .and_then(Rotation::from_degrees)
            .unwrap_or_default();
        infos.push(PageInfo { id, media_box, rotation });
    }

    if infos.is_empty() {
        return Err(PdfEngineError::Backend("document has no pages".to_owned()));
    }

    Ok(infos)
}

/// Looks up a page attribute, walking `/Parent` links for inherited values.
pub(crate) fn inherited<'a>(doc: &'a Document, page: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page);
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

fn parse_media_box(doc: &Document, array: &[Object]) -> Option<MediaBox> {
    if array.len() != 4 {
        return None;
    }
    let values: Vec<f32> =
        array.iter().map(|obj| number(resolve(doc, obj))).collect::<Option<_>>()?;
    let media_box = MediaBox {
        x0: values[0].min(values[2]),
        y0: values[1].min(values[3]),
        x1: values[0].max(values[2]),
        y1: values[1].max(values[3]),
    };
    if media_box.x1 - media_box.x0 <= 0.0 || media_box.y1 - media_box.y0 <= 0.0 {
        return None;
    }
    Some(media_box)
}

pub(crate) fn write_rotation(
    doc: &mut Document,
    page: &mut PageInfo,
    rotation: Rotation,
) -> Result<(), PdfEngineError> {
    let dict = doc.get_object_mut(page.id).and_then(Object::as_dict_mut)?;
    dict.set("Rotate", Object::Integer(i64::from(rotation.degrees())));
    page.rotation = rotation;
    Ok(())
}

impl DocumentEngine for LopdfEngine {
    type Writer = LopdfWriter;

    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let doc = load_document(&bytes)?;
        let pages = read_pages(&doc)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        log::info!("opened document {} with {} page(s)", handle.raw(), pages.len());
        self.docs.insert(handle, DocumentRecord { doc, pages });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.pages.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        Ok(self.record(handle)?.page(page_index)?.media_box.size())
    }

    fn rotation(&self, handle: DocumentHandle, page_index: u32) -> Result<Rotation, PdfEngineError> {
        Ok(self.record(handle)?.page(page_index)?.rotation)
    }

    fn set_rotation(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        rotation: Rotation,
    ) -> Result<(), PdfEngineError> {
        let record = self.record_mut(handle)?;
        let page_count = record.pages.len() as u32;
        let page = record
            .pages
            .get_mut(page_index as usize)
            .ok_or(PdfEngineError::PageOutOfRange { page: page_index, page_count })?;
        write_rotation(&mut record.doc, page, rotation)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let record = self.record(handle)?;
        let page = record.page(request.page_index)?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };
        raster::render_page(&record.doc, page, scale)
    }

    fn writer(&self, handle: DocumentHandle) -> Result<LopdfWriter, PdfEngineError> {
        let record = self.record(handle)?;
        Ok(LopdfWriter::new(record.doc.clone(), record.pages.clone()))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleDocument;

    fn two_page_pdf() -> Vec<u8> {
        SampleDocument::new()
            .page(612.0, 792.0)
            .text(72.0, 100.0, 12.0, "First page")
            .page(300.0, 400.0)
            .text(20.0, 50.0, 10.0, "Second")
            .build()
            .expect("sample should build")
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(two_page_pdf())).expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);
        let size = engine.page_size(handle, 1).expect("size should succeed");
        assert_eq!(size, PageSize { width_pt: 300.0, height_pt: 400.0 });
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(two_page_pdf())).expect("open should succeed");

        let err = engine.page_size(handle, 5).expect_err("page 5 should not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 5, page_count: 2 }));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn garbage_bytes_fail_to_open() {
        let mut engine = LopdfEngine::new();
        assert!(engine.open(OpenSource::Bytes(b"not a pdf".to_vec())).is_err());
    }

    #[test]
    fn rotation_is_read_and_updated() {
        let bytes = SampleDocument::new()
            .page(200.0, 100.0)
            .rotate(90)
            .build()
            .expect("sample should build");
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(bytes)).expect("open should succeed");

        assert_eq!(engine.rotation(handle, 0).expect("rotation"), Rotation::Deg90);
        engine.set_rotation(handle, 0, Rotation::Deg180).expect("set rotation");
        assert_eq!(engine.rotation(handle, 0).expect("rotation"), Rotation::Deg180);
    }

    #[test]
    fn render_is_unrotated_and_scaled() {
        let bytes = SampleDocument::new()
            .page(200.0, 100.0)
            .rotate(90)
            .build()
            .expect("sample should build");
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(bytes)).expect("open should succeed");

        let image = engine
            .render_page(handle, RenderRequest { page_index: 0, scale: 0.5 })
            .expect("render should succeed");
        assert_eq!(image.dimensions(), (100, 50));
    }

    #[test]
    fn rotation_from_degrees_normalizes() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Deg270.clockwise(), Rotation::Deg0);
    }

    #[test]
    fn close_forgets_the_document() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(two_page_pdf())).expect("open should succeed");
        engine.close(handle).expect("close should succeed");
        assert!(engine.page_count(handle).is_err());
    }
}
