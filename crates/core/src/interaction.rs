//! Pointer interaction: drawing, moving and resizing annotations
//!
//! The state machine works in unrotated device space. It never mutates the
//! store; finished gestures come out as [`GestureOutcome`]s which the session
//! applies under an undo snapshot.

use crate::annotation::{AnnotationId, AnnotationStore, ShapeGeometry};
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Active tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Select,
    /// Text box frame
    #[default]
    Frame,
    Rectangle,
    Oval,
    Line,
    Freehand,
    InsertImage,
}

impl Tool {
    /// Tools that draw a new annotation on an empty spot
    pub fn creates_shapes(self) -> bool {
        matches!(self, Tool::Frame | Tool::Rectangle | Tool::Oval | Tool::Line | Tool::Freehand)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Resize handle around a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleZone {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Left,
    Right,
    Top,
    Bottom,
}

impl HandleZone {
    /// Hit-test order: corners win over edges
    pub const ALL: [HandleZone; 8] = [
        HandleZone::TopLeft,
        HandleZone::TopRight,
        HandleZone::BottomLeft,
        HandleZone::BottomRight,
        HandleZone::Left,
        HandleZone::Right,
        HandleZone::Top,
        HandleZone::Bottom,
    ];

    fn moves_left(self) -> bool {
        matches!(self, HandleZone::TopLeft | HandleZone::BottomLeft | HandleZone::Left)
    }

    fn moves_right(self) -> bool {
        matches!(self, HandleZone::TopRight | HandleZone::BottomRight | HandleZone::Right)
    }

    fn moves_top(self) -> bool {
        matches!(self, HandleZone::TopLeft | HandleZone::TopRight | HandleZone::Top)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, HandleZone::BottomLeft | HandleZone::BottomRight | HandleZone::Bottom)
    }

    fn contains(self, bounds: Rect, point: Point, size: f32) -> bool {
        let near = |value: f32, edge: f32| (value - edge).abs() <= size;
        let within_x = point.x >= bounds.x0 && point.x <= bounds.x1;
        let within_y = point.y >= bounds.y0 && point.y <= bounds.y1;
        match self {
            HandleZone::TopLeft => near(point.x, bounds.x0) && near(point.y, bounds.y0),
            HandleZone::TopRight => near(point.x, bounds.x1) && near(point.y, bounds.y0),
            HandleZone::BottomLeft => near(point.x, bounds.x0) && near(point.y, bounds.y1),
            HandleZone::BottomRight => near(point.x, bounds.x1) && near(point.y, bounds.y1),
            HandleZone::Left => near(point.x, bounds.x0) && within_y,
            HandleZone::Right => near(point.x, bounds.x1) && within_y,
            HandleZone::Top => near(point.y, bounds.y0) && within_x,
            HandleZone::Bottom => near(point.y, bounds.y1) && within_x,
        }
    }

    /// Zone of `bounds` under `point`, if any
    pub fn hit(bounds: Rect, point: Point, size: f32) -> Option<HandleZone> {
        Self::ALL.into_iter().find(|zone| zone.contains(bounds, point, size))
    }

    /// Bounds after dragging this handle to `point`
    pub fn drag(self, origin: Rect, point: Point) -> Rect {
        let mut bounds = origin;
        if self.moves_left() {
            bounds.x0 = point.x;
        }
        if self.moves_right() {
            bounds.x1 = point.x;
        }
        if self.moves_top() {
            bounds.y0 = point.y;
        }
        if self.moves_bottom() {
            bounds.y1 = point.y;
        }
        bounds.normalized()
    }
}

/// Gesture thresholds in device pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionConfig {
    pub handle_size: f32,
    pub min_gesture_size: f32,
    pub hit_tolerance: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self { handle_size: 10.0, min_gesture_size: 5.0, hit_tolerance: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Drawing {
        tool: Tool,
        start: Point,
        current: Point,
        points: Vec<Point>,
    },
    Moving {
        id: AnnotationId,
        origin_bounds: Rect,
        start: Point,
        current: Point,
    },
    Resizing {
        id: AnnotationId,
        handle: HandleZone,
        origin_bounds: Rect,
        start: Point,
        current: Point,
    },
}

/// What the host should draw while a gesture is in progress
#[derive(Debug, Clone, PartialEq)]
pub enum GesturePreview {
    Rectangle(Rect),
    Oval(Rect),
    Line { start: Point, end: Point },
    Polyline(Vec<Point>),
    /// Outline of a selection being moved or resized
    Selection(Rect),
}

/// Immediate effect of a pointer press
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerResponse {
    None,
    Selected(AnnotationId),
    SelectionCleared,
    /// Insert the pending image with its top-left at this document point
    PlaceImage(Point),
}

/// Finished gesture to be applied to the store
#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    Create {
        tool: Tool,
        /// Device-space box of the gesture
        device_bounds: Rect,
        /// Shape in document space
        geometry: ShapeGeometry,
    },
    Move {
        id: AnnotationId,
        dx: f32,
        dy: f32,
    },
    Resize {
        id: AnnotationId,
        bounds: Rect,
    },
}

/// Read-only view of the page under the pointer
#[derive(Debug, Clone, Copy)]
pub struct PointerContext<'a> {
    pub store: &'a AnnotationStore,
    pub page_index: u32,
    pub zoom: f32,
    pub selection: Option<AnnotationId>,
    pub tool: Tool,
}

#[derive(Debug, Clone, Default)]
pub struct InteractionMachine {
    state: InteractionState,
    config: InteractionConfig,
}

impl InteractionMachine {
    pub fn new(config: InteractionConfig) -> Self {
        Self { state: InteractionState::Idle, config }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn config(&self) -> InteractionConfig {
        self.config
    }

    /// Abandon any gesture in progress
    pub fn cancel(&mut self) {
        self.state = InteractionState::Idle;
    }

    pub fn pointer_down(
        &mut self,
        context: PointerContext<'_>,
        point: Point,
        button: PointerButton,
    ) -> PointerResponse {
        self.state = InteractionState::Idle;

        let selected = context
            .selection
            .and_then(|id| context.store.get(id))
            .filter(|annotation| annotation.page_index() == context.page_index);
        if let (Some(annotation), PointerButton::Primary) = (selected, button) {
            let bounds = annotation.bounds().to_device(context.zoom);
            if let Some(handle) = HandleZone::hit(bounds, point, self.config.handle_size) {
                self.state = InteractionState::Resizing {
                    id: annotation.id(),
                    handle,
                    origin_bounds: bounds,
                    start: point,
                    current: point,
                };
                return PointerResponse::Selected(annotation.id());
            }
        }

        let tolerance = self.config.hit_tolerance / context.zoom.max(f32::EPSILON);
        let document_point = point.to_document(context.zoom);
        if let Some(hit) = context.store.hit_test(context.page_index, document_point, tolerance) {
            let starts_move = match button {
                PointerButton::Secondary => true,
                PointerButton::Primary => {
                    context.tool == Tool::Select && context.selection == Some(hit.id())
                }
            };
            if starts_move {
                self.state = InteractionState::Moving {
                    id: hit.id(),
                    origin_bounds: hit.bounds().to_device(context.zoom),
                    start: point,
                    current: point,
                };
            }
            return PointerResponse::Selected(hit.id());
        }

        match (button, context.tool) {
            (PointerButton::Primary, Tool::InsertImage) => PointerResponse::PlaceImage(document_point),
            (PointerButton::Primary, tool) if tool.creates_shapes() => {
                self.state = InteractionState::Drawing {
                    tool,
                    start: point,
                    current: point,
                    points: vec![point],
                };
                PointerResponse::None
            }
            _ => PointerResponse::SelectionCleared,
        }
    }

    pub fn pointer_move(&mut self, point: Point) {
        match &mut self.state {
            InteractionState::Idle => {}
            InteractionState::Drawing { tool, current, points, .. } => {
                *current = point;
                if *tool == Tool::Freehand {
                    points.push(point);
                }
            }
            InteractionState::Moving { current, .. } | InteractionState::Resizing { current, .. } => {
                *current = point;
            }
        }
    }

    /// Finish the gesture. `None` means it was rejected or had no effect.
    pub fn pointer_up(&mut self, point: Point, zoom: f32) -> Option<GestureOutcome> {
        // The release position ends the gesture but is not a freehand sample.
        match &mut self.state {
            InteractionState::Idle => {}
            InteractionState::Drawing { current, .. }
            | InteractionState::Moving { current, .. }
            | InteractionState::Resizing { current, .. } => *current = point,
        }
        let state = std::mem::take(&mut self.state);
        let outcome = match state {
            InteractionState::Idle => None,
            InteractionState::Drawing { tool, start, current, points } => {
                self.finish_drawing(tool, start, current, &points, zoom)
            }
            InteractionState::Moving { id, start, current, .. } => {
                let dx = (current.x - start.x) / zoom;
                let dy = (current.y - start.y) / zoom;
                (dx != 0.0 || dy != 0.0).then_some(GestureOutcome::Move { id, dx, dy })
            }
            InteractionState::Resizing { id, handle, origin_bounds, current, .. } => {
                let bounds = handle.drag(origin_bounds, current);
                // Flat bounds stay resizable along their long axis.
                let collapsed = (bounds.width() < 1.0 && bounds.height() < 1.0)
                    || (bounds.is_degenerate(1.0) && !origin_bounds.is_degenerate(1.0));
                (!collapsed && bounds != origin_bounds)
                    .then(|| GestureOutcome::Resize { id, bounds: bounds.to_document(zoom) })
            }
        };

        match &outcome {
            Some(outcome) => log::debug!("gesture finished: {outcome:?}"),
            None => log::debug!("gesture rejected"),
        }
        outcome
    }

    fn finish_drawing(
        &self,
        tool: Tool,
        start: Point,
        current: Point,
        points: &[Point],
        zoom: f32,
    ) -> Option<GestureOutcome> {
        if tool == Tool::Freehand {
            if points.len() < 2 {
                return None;
            }
            let points: Vec<Point> = points.iter().map(|point| point.to_document(zoom)).collect();
            let mut bounds = Rect::bounding(&points)?;
            bounds.x1 = bounds.x1.max(bounds.x0 + 1.0);
            bounds.y1 = bounds.y1.max(bounds.y0 + 1.0);
            return Some(GestureOutcome::Create {
                tool,
                device_bounds: bounds.to_device(zoom),
                geometry: ShapeGeometry::Freehand { points },
            });
        }

        let device_bounds = Rect::from_points(start, current);
        if !device_bounds.meets_min_size(self.config.min_gesture_size) {
            return None;
        }
        let geometry = match tool {
            Tool::Oval => ShapeGeometry::Oval,
            Tool::Line => ShapeGeometry::Line {
                start: start.to_document(zoom),
                end: current.to_document(zoom),
            },
            _ => ShapeGeometry::Rectangle,
        };
        Some(GestureOutcome::Create { tool, device_bounds, geometry })
    }

    /// Outline to draw for the gesture in progress
    pub fn preview(&self) -> Option<GesturePreview> {
        match &self.state {
            InteractionState::Idle => None,
            InteractionState::Drawing { tool, start, current, points } => Some(match tool {
                Tool::Oval => GesturePreview::Oval(Rect::from_points(*start, *current)),
                Tool::Line => GesturePreview::Line { start: *start, end: *current },
                Tool::Freehand => GesturePreview::Polyline(points.clone()),
                _ => GesturePreview::Rectangle(Rect::from_points(*start, *current)),
            }),
            InteractionState::Moving { origin_bounds, start, current, .. } => Some(
                GesturePreview::Selection(origin_bounds.translate(current.x - start.x, current.y - start.y)),
            ),
            InteractionState::Resizing { handle, origin_bounds, current, .. } => {
                Some(GesturePreview::Selection(handle.drag(*origin_bounds, *current)))
            }
        }
    }
}
