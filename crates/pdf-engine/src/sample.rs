//! Synthetic documents for tests and demos.
//!
//! Coordinates follow the editor convention (top-left origin, y down);
//! text positions name the baseline.

use crate::PdfEngineError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

#[derive(Debug, Clone)]
struct SamplePage {
    width: f32,
    height: f32,
    rotate: i64,
    operations: Vec<Operation>,
}

/// Builder for small single-font PDFs.
///
/// ```
/// use pagemark_engine::sample::SampleDocument;
///
/// let bytes = SampleDocument::new()
///     .page(612.0, 792.0)
///     .text(72.0, 100.0, 12.0, "Hello")
///     .build()
///     .unwrap();
/// assert!(bytes.starts_with(b"%PDF"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleDocument {
    pages: Vec<SamplePage>,
}

impl SampleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new page; later calls draw on it.
    pub fn page(mut self, width: f32, height: f32) -> Self {
        self.pages.push(SamplePage { width, height, rotate: 0, operations: Vec::new() });
        self
    }

    pub fn rotate(mut self, degrees: i64) -> Self {
        self.current().rotate = degrees;
        self
    }

    /// Helvetica text with its baseline at `(x, baseline)`.
    pub fn text(self, x: f32, baseline: f32, size: f32, text: &str) -> Self {
        self.runs(x, baseline, size, &[text])
    }

    /// Several `Tj` runs inside one text object, each starting where the
    /// previous one ended.
    pub fn runs(mut self, x: f32, baseline: f32, size: f32, runs: &[&str]) -> Self {
        let page = self.current();
        let y = page.height - baseline;
        page.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
        ]);
        for run in runs {
            page.operations.push(Operation::new("Tj", vec![Object::string_literal(*run)]));
        }
        page.operations.push(Operation::new("ET", vec![]));
        self
    }

    /// Filled rectangle between two corners.
    pub fn fill_box(mut self, x0: f32, y0: f32, x1: f32, y1: f32, rgb: [u8; 3]) -> Self {
        let page = self.current();
        let height = page.height;
        let [r, g, b] = rgb.map(|channel| f32::from(channel) / 255.0);
        let (left, right) = (x0.min(x1), x0.max(x1));
        let (top, bottom) = (y0.min(y1), y0.max(y1));
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new(
                "re",
                vec![
                    left.into(),
                    (height - bottom).into(),
                    (right - left).into(),
                    (bottom - top).into(),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
        self
    }

    fn current(&mut self) -> &mut SamplePage {
        if self.pages.is_empty() {
            self.pages.push(SamplePage {
                width: 612.0,
                height: 792.0,
                rotate: 0,
                operations: Vec::new(),
            });
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn build(&self) -> Result<Vec<u8>, PdfEngineError> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len().max(1));
        let fallback = [SamplePage { width: 612.0, height: 792.0, rotate: 0, operations: Vec::new() }];
        let pages = if self.pages.is_empty() { &fallback[..] } else { &self.pages[..] };

        for page in pages {
            let content = Content { operations: page.operations.clone() }.encode()?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let mut dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            };
            if page.rotate != 0 {
                dict.set("Rotate", page.rotate);
            }
            kids.push(doc.add_object(dict).into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)?;
        Ok(output)
    }
}
