//! Document/device coordinate conversion
//!
//! Document space is in points with the origin at the top-left corner of the
//! unrotated page and y growing downward. Device space is the same frame
//! scaled by the zoom factor (pixels). Page rotation is not part of this
//! transform: it is applied to the composited bitmap by the render pipeline.

use pagemark_engine::PageRect;
use serde::{Deserialize, Serialize};

/// Smallest zoom factor accepted by the transforms.
pub const MIN_ZOOM: f32 = 0.01;

/// Clamp a zoom factor to the supported range.
pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.max(MIN_ZOOM)
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn to_device(&self, zoom: f32) -> Point {
        let zoom = clamp_zoom(zoom);
        Point::new(self.x * zoom, self.y * zoom)
    }

    pub fn to_document(&self, zoom: f32) -> Point {
        let zoom = clamp_zoom(zoom);
        Point::new(self.x / zoom, self.y / zoom)
    }
}

/// Axis-aligned rectangle, normalized so `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build from any two corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0: x0.min(x1), y0: y0.min(y1), x1: x0.max(x1), y1: y0.max(y1) }
    }

    pub fn from_points(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    /// Smallest rect containing every point, `None` for an empty slice.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        Some(points.iter().skip(1).fold(Rect::new(first.x, first.y, first.x, first.y), |rect, p| {
            Rect { x0: rect.x0.min(p.x), y0: rect.y0.min(p.y), x1: rect.x1.max(p.x), y1: rect.y1.max(p.y) }
        }))
    }

    /// Restore the corner ordering after direct field edits.
    pub fn normalized(&self) -> Self {
        Self::new(self.x0, self.y0, self.x1, self.y1)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains(&self, point: Point, tolerance: f32) -> bool {
        point.x >= self.x0 - tolerance
            && point.x <= self.x1 + tolerance
            && point.y >= self.y0 - tolerance
            && point.y <= self.y1 + tolerance
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect { x0: self.x0 + dx, y0: self.y0 + dy, x1: self.x1 + dx, y1: self.y1 + dy }
    }

    pub fn expand(&self, amount: f32) -> Rect {
        Rect::new(self.x0 - amount, self.y0 - amount, self.x1 + amount, self.y1 + amount)
    }

    /// True when either side is shorter than `epsilon`.
    pub fn is_degenerate(&self, epsilon: f32) -> bool {
        self.width() < epsilon || self.height() < epsilon
    }

    /// True when both sides reach `min`.
    pub fn meets_min_size(&self, min: f32) -> bool {
        self.width() >= min && self.height() >= min
    }

    pub fn to_device(&self, zoom: f32) -> Rect {
        let zoom = clamp_zoom(zoom);
        Rect { x0: self.x0 * zoom, y0: self.y0 * zoom, x1: self.x1 * zoom, y1: self.y1 * zoom }
    }

    pub fn to_document(&self, zoom: f32) -> Rect {
        let zoom = clamp_zoom(zoom);
        Rect { x0: self.x0 / zoom, y0: self.y0 / zoom, x1: self.x1 / zoom, y1: self.y1 / zoom }
    }
}

impl From<Rect> for PageRect {
    fn from(rect: Rect) -> Self {
        PageRect::new(rect.x0, rect.y0, rect.x1, rect.y1)
    }
}
