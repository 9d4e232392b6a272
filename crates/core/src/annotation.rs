//! Annotation data model and per-page store
//!
//! An annotation is one edit placed on one page: a mask, a redaction, a
//! stroked shape, a rendered text block or an inserted image. Bounds are kept
//! in document space (points, top-left origin of the unrotated page).
//! The payload lives in [`AnnotationBody`], so kinds never carry fields of
//! another kind.

use crate::geometry::{Point, Rect};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Unique identifier for an annotation
///
/// Stable across undo snapshots. Duplicates and pastes get a fresh id.
pub type AnnotationId = uuid::Uuid;

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Opaque grey for a text density between 0 (white) and 100 (black)
    pub fn from_density(density: u8) -> Self {
        let density = u32::from(density.min(100));
        let value = (255 * (100 - density) / 100) as u8;
        Self::rgb(value, value, value)
    }

    pub fn to_rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_rgba(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// `#rrggbb`, or `#rrggbbaa` when not opaque
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Common colors
impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const LIGHT_GREY: Color = Color { r: 211, g: 211, b: 211, a: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color {0:?}, expected #rrggbb or #rrggbbaa")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().trim_start_matches('#');
        let channel = |index: usize| {
            hex.get(index..index + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ParseColorError(value.to_owned()))
        };
        match hex.len() {
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(ParseColorError(value.to_owned())),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Stroke settings for shapes and frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: Color,
    /// Width in points
    pub width: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self { color: Color::BLACK, width: 2.0 }
    }
}

/// Shape drawn inside an annotation's bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeGeometry {
    /// Outline of the bounds
    Rectangle,
    /// Ellipse inscribed in the bounds
    Oval,
    Line { start: Point, end: Point },
    Freehand { points: Vec<Point> },
}

impl ShapeGeometry {
    fn points_mut(&mut self) -> Vec<&mut Point> {
        match self {
            ShapeGeometry::Rectangle | ShapeGeometry::Oval => Vec::new(),
            ShapeGeometry::Line { start, end } => vec![start, end],
            ShapeGeometry::Freehand { points } => points.iter_mut().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeData {
    pub geometry: ShapeGeometry,
    pub stroke: StrokeStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
    /// Upper bound for the fitted size, in points
    pub font_size: f32,
    pub font_family: String,
    #[serde(default)]
    pub bold: bool,
    pub color: Color,
}

/// Encoded image in its source format
///
/// Bytes are shared between snapshots and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub bytes: Arc<Vec<u8>>,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: Arc::new(bytes) }
    }
}

/// Kind-specific payload of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationBody {
    /// Text box frame, the default result of a drawing gesture
    Frame(ShapeData),
    Redaction,
    MaskBlack,
    MaskWhite,
    Shape(ShapeData),
    TextImage(TextData),
    ImageObject(ImageData),
}

/// Discriminant of [`AnnotationBody`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Frame,
    Redaction,
    MaskBlack,
    MaskWhite,
    Shape,
    TextImage,
    ImageObject,
}

impl AnnotationKind {
    /// Painting tier; lower tiers are drawn first
    pub fn z_tier(self) -> u8 {
        match self {
            AnnotationKind::Redaction => 0,
            AnnotationKind::MaskBlack | AnnotationKind::MaskWhite => 10,
            AnnotationKind::ImageObject => 15,
            AnnotationKind::Shape | AnnotationKind::Frame => 20,
            AnnotationKind::TextImage => 30,
        }
    }
}

impl AnnotationBody {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationBody::Frame(_) => AnnotationKind::Frame,
            AnnotationBody::Redaction => AnnotationKind::Redaction,
            AnnotationBody::MaskBlack => AnnotationKind::MaskBlack,
            AnnotationBody::MaskWhite => AnnotationKind::MaskWhite,
            AnnotationBody::Shape(_) => AnnotationKind::Shape,
            AnnotationBody::TextImage(_) => AnnotationKind::TextImage,
            AnnotationBody::ImageObject(_) => AnnotationKind::ImageObject,
        }
    }

    fn shape_mut(&mut self) -> Option<&mut ShapeData> {
        match self {
            AnnotationBody::Frame(shape) | AnnotationBody::Shape(shape) => Some(shape),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    id: AnnotationId,
    page_index: u32,
    bounds: Rect,
    body: AnnotationBody,
}

impl Annotation {
    /// Create an annotation with a fresh id
    pub fn new(page_index: u32, bounds: Rect, body: AnnotationBody) -> Self {
        Self { id: AnnotationId::new_v4(), page_index, bounds: bounds.normalized(), body }
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn body(&self) -> &AnnotationBody {
        &self.body
    }

    pub fn kind(&self) -> AnnotationKind {
        self.body.kind()
    }

    pub fn hit_test(&self, point: Point, tolerance: f32) -> bool {
        self.bounds.contains(point, tolerance)
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.bounds = self.bounds.translate(dx, dy);
        if let Some(shape) = self.body.shape_mut() {
            for point in shape.geometry.points_mut() {
                *point = point.offset(dx, dy);
            }
        }
    }

    /// Re-project embedded points proportionally into `new_bounds`
    fn resize(&mut self, new_bounds: Rect) {
        let old = self.bounds;
        let new_bounds = new_bounds.normalized();
        let scale = |new: f32, old: f32| if old.abs() > f32::EPSILON { new / old } else { 1.0 };
        let sx = scale(new_bounds.width(), old.width());
        let sy = scale(new_bounds.height(), old.height());

        if let Some(shape) = self.body.shape_mut() {
            for point in shape.geometry.points_mut() {
                *point = Point::new(
                    new_bounds.x0 + (point.x - old.x0) * sx,
                    new_bounds.y0 + (point.y - old.y0) * sy,
                );
            }
        }
        self.bounds = new_bounds;
    }

    /// Deep copy with a fresh id, offset and moved to `page_index`
    pub fn duplicate(&self, offset: f32, page_index: u32) -> Self {
        let mut copy = self.clone();
        copy.id = AnnotationId::new_v4();
        copy.page_index = page_index;
        copy.translate(offset, offset);
        copy
    }
}

/// All annotations of a document, grouped by page in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    pages: BTreeMap<u32, Vec<Annotation>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an annotation from a device-space gesture box
    ///
    /// Returns `None` without mutating when either device dimension is below
    /// `min_device_size`.
    pub fn create(
        &mut self,
        page_index: u32,
        device_bounds: Rect,
        zoom: f32,
        min_device_size: f32,
        body: AnnotationBody,
    ) -> Option<AnnotationId> {
        let device_bounds = device_bounds.normalized();
        if !device_bounds.meets_min_size(min_device_size) {
            return None;
        }
        Some(self.insert(Annotation::new(page_index, device_bounds.to_document(zoom), body)))
    }

    /// Add a prepared annotation, keeping its id
    pub fn insert(&mut self, mut annotation: Annotation) -> AnnotationId {
        annotation.bounds = annotation.bounds.normalized();
        let id = annotation.id;
        self.pages.entry(annotation.page_index).or_default().push(annotation);
        id
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.iter().find(|annotation| annotation.id == id)
    }

    fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.pages.values_mut().flatten().find(|annotation| annotation.id == id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.get(id).is_some()
    }

    /// Replace the payload, dropping whatever the previous kind carried
    pub fn reclassify(&mut self, id: AnnotationId, body: AnnotationBody) -> bool {
        match self.get_mut(id) {
            Some(annotation) => {
                annotation.body = body;
                true
            }
            None => false,
        }
    }

    /// Move bounds and every embedded point by `(dx, dy)` document units
    pub fn translate(&mut self, id: AnnotationId, dx: f32, dy: f32) -> bool {
        match self.get_mut(id) {
            Some(annotation) => {
                annotation.translate(dx, dy);
                true
            }
            None => false,
        }
    }

    /// Set new bounds, scaling embedded points proportionally
    pub fn resize(&mut self, id: AnnotationId, new_bounds: Rect) -> bool {
        match self.get_mut(id) {
            Some(annotation) => {
                annotation.resize(new_bounds);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: AnnotationId) -> Option<Annotation> {
        let page = self.get(id)?.page_index;
        let annotations = self.pages.get_mut(&page)?;
        let position = annotations.iter().position(|annotation| annotation.id == id)?;
        let removed = annotations.remove(position);
        if annotations.is_empty() {
            self.pages.remove(&page);
        }
        Some(removed)
    }

    /// Copy `id` onto `page_index`, offset by `offset` document units
    pub fn duplicate(
        &mut self,
        id: AnnotationId,
        offset: f32,
        page_index: u32,
    ) -> Option<AnnotationId> {
        let copy = self.get(id)?.duplicate(offset, page_index);
        Some(self.insert(copy))
    }

    /// Annotations of a page in insertion order
    pub fn page(&self, page_index: u32) -> &[Annotation] {
        self.pages.get(&page_index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Annotations of a page in painting order (stable by insertion order)
    pub fn render_order(&self, page_index: u32) -> Vec<&Annotation> {
        let mut ordered: Vec<&Annotation> = self.page(page_index).iter().collect();
        ordered.sort_by_key(|annotation| annotation.kind().z_tier());
        ordered
    }

    /// Topmost annotation under `point` (document space)
    pub fn hit_test(&self, page_index: u32, point: Point, tolerance: f32) -> Option<&Annotation> {
        self.render_order(page_index)
            .into_iter()
            .rev()
            .find(|annotation| annotation.hit_test(point, tolerance))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.pages.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Pages holding at least one annotation
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
