//! Document writer: page rotation, content redaction and overlay serialization.

use crate::content::{self, UserBox, XObjects};
use crate::{
    inherited, page_at, resolve, write_rotation, DocumentWriter, PageInfo, PageRect, PageSize,
    PdfEngineError, RgbaImage, Rotation,
};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;

/// Writer over a private copy of an open document.
///
/// Redactions rewrite the page content immediately. Fills and images are
/// queued per page and appended on [`DocumentWriter::serialize`], after the
/// original content wrapped in `q`/`Q` so its graphics state cannot leak
/// into the overlay.
#[derive(Debug)]
pub struct LopdfWriter {
    doc: Document,
    pages: Vec<PageInfo>,
    overlays: BTreeMap<u32, Vec<u8>>,
    next_image: u32,
}

impl LopdfWriter {
    pub(crate) fn new(doc: Document, pages: Vec<PageInfo>) -> Self {
        Self { doc, pages, overlays: BTreeMap::new(), next_image: 0 }
    }

    fn page(&self, page_index: u32) -> Result<PageInfo, PdfEngineError> {
        page_at(&self.pages, page_index).copied()
    }

    fn overlay(&mut self, page_index: u32) -> &mut Vec<u8> {
        self.overlays.entry(page_index).or_default()
    }

    fn replace_content(&mut self, page_id: ObjectId, bytes: &[u8]) -> Result<(), PdfEngineError> {
        let stream = Stream::new(dictionary! { "Filter" => "FlateDecode" }, deflate(bytes)?);
        let stream_id = self.doc.add_object(stream);
        let page = self.doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        page.set("Contents", Object::Reference(stream_id));
        Ok(())
    }

    /// Adds an XObject to the page's own resources and returns its name.
    fn register_xobject(
        &mut self,
        page_id: ObjectId,
        object: ObjectId,
    ) -> Result<String, PdfEngineError> {
        let own = self.doc.get_dictionary(page_id)?.get(b"Resources").ok().cloned();
        // Copy shared or inherited resources onto the page before editing them.
        let mut resources = match own {
            Some(Object::Dictionary(dict)) => dict,
            Some(Object::Reference(id)) => self.doc.get_dictionary(id)?.clone(),
            _ => inherited(&self.doc, page_id, b"Resources")
                .and_then(|obj| obj.as_dict().ok())
                .cloned()
                .unwrap_or_else(Dictionary::new),
        };
        let mut xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|obj| resolve(&self.doc, obj).as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new);

        let name = loop {
            self.next_image += 1;
            let candidate = format!("PmIm{}", self.next_image);
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        xobjects.set(name.as_str(), Object::Reference(object));
        resources.set("XObject", Object::Dictionary(xobjects));

        let page = self.doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        page.set("Resources", Object::Dictionary(resources));
        Ok(name)
    }

    fn flush_overlays(&mut self) -> Result<(), PdfEngineError> {
        let overlays = std::mem::take(&mut self.overlays);
        for (page_index, overlay) in overlays {
            let page = self.page(page_index)?;
            let original = self.doc.get_page_content(page.id)?;

            let mut bytes = Vec::with_capacity(original.len() + overlay.len() + 8);
            bytes.extend_from_slice(b"q\n");
            bytes.extend_from_slice(&original);
            bytes.extend_from_slice(b"\nQ\n");
            bytes.extend_from_slice(&overlay);
            self.replace_content(page.id, &bytes)?;
        }
        Ok(())
    }
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>, PdfEngineError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn user_box(page: &PageInfo, rect: PageRect) -> UserBox {
    let (x, y, w, h) = page.media_box.to_user(rect);
    UserBox { x0: x, y0: y, x1: x + w, y1: y + h }
}

fn rgb_operand(channel: u8) -> f32 {
    f32::from(channel) / 255.0
}

impl DocumentWriter for LopdfWriter {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        Ok(self.page(page_index)?.media_box.size())
    }

    fn set_rotation(&mut self, page_index: u32, rotation: Rotation) -> Result<(), PdfEngineError> {
        let page_count = self.pages.len() as u32;
        let page = self
            .pages
            .get_mut(page_index as usize)
            .ok_or(PdfEngineError::PageOutOfRange { page: page_index, page_count })?;
        write_rotation(&mut self.doc, page, rotation)
    }

    fn apply_redactions(
        &mut self,
        page_index: u32,
        rects: &[PageRect],
        fill: [u8; 3],
    ) -> Result<usize, PdfEngineError> {
        let page = self.page(page_index)?;
        if rects.is_empty() {
            return Ok(0);
        }

        let areas: Vec<UserBox> = rects.iter().map(|rect| user_box(&page, *rect)).collect();
        let bytes = self.doc.get_page_content(page.id)?;
        let content = Content::decode(&bytes)?;

        let (kept, removed) = {
            let xobjects =
                XObjects::from_resources(&self.doc, inherited(&self.doc, page.id, b"Resources"));
            let marks = content::interpret(&content.operations, &xobjects);
            let (dropped, removed) = content::redacted_ops(&marks, &areas);
            let kept = (removed > 0).then(|| content::strip_ops(content.operations, &marks, &dropped));
            (kept, removed)
        };

        if let Some(kept) = kept {
            let encoded = Content { operations: kept }.encode()?;
            self.replace_content(page.id, &encoded)?;
        }
        log::debug!("page {page_index}: redacted {removed} content item(s) in {} area(s)", rects.len());

        for rect in rects {
            self.fill_rect(page_index, *rect, fill)?;
        }
        Ok(removed)
    }

    fn fill_rect(
        &mut self,
        page_index: u32,
        rect: PageRect,
        fill: [u8; 3],
    ) -> Result<(), PdfEngineError> {
        let page = self.page(page_index)?;
        let (x, y, w, h) = page.media_box.to_user(rect);
        let ops = format!(
            "q {:.4} {:.4} {:.4} rg {x:.3} {y:.3} {w:.3} {h:.3} re f Q\n",
            rgb_operand(fill[0]),
            rgb_operand(fill[1]),
            rgb_operand(fill[2]),
        );
        self.overlay(page_index).extend_from_slice(ops.as_bytes());
        Ok(())
    }

    fn insert_image(
        &mut self,
        page_index: u32,
        rect: PageRect,
        image: &RgbaImage,
    ) -> Result<(), PdfEngineError> {
        let page = self.page(page_index)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in image.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let smask_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        ));
        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
                "SMask" => smask_id,
            },
            deflate(&rgb)?,
        ));

        let name = self.register_xobject(page.id, image_id)?;
        let (x, y, w, h) = page.media_box.to_user(rect);
        let ops = format!("q {w:.3} 0 0 {h:.3} {x:.3} {y:.3} cm /{name} Do Q\n");
        self.overlay(page_index).extend_from_slice(ops.as_bytes());
        Ok(())
    }

    fn serialize(mut self) -> Result<Vec<u8>, PdfEngineError> {
        self.flush_overlays()?;
        // Drops replaced content streams so redacted operations leave the file.
        self.doc.prune_objects();

        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        Ok(output)
    }
}
