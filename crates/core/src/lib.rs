//! Pagemark Core Library
//!
//! Editing model for PDF page overlays: annotations, pointer interaction,
//! composited rendering, snapshot undo and export.

pub mod annotation;
pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod render;
pub mod script;
pub mod session;
pub mod text;

pub use annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationKind, AnnotationStore, Color, ImageData,
    ParseColorError, ShapeData, ShapeGeometry, StrokeStyle, TextData,
};
pub use config::{EditorConfig, TextSettings};
pub use error::{EditorError, EditorResult};
pub use export::{ExportOptions, ExportSummary};
pub use geometry::{clamp_zoom, Point, Rect, MIN_ZOOM};
pub use history::{EditorSnapshot, UndoHistory};
pub use interaction::{
    GestureOutcome, GesturePreview, HandleZone, InteractionConfig, InteractionMachine,
    InteractionState, PointerButton, PointerResponse, Tool,
};
pub use render::RenderPipeline;
pub use script::EditScript;
pub use session::EditorSession;
pub use text::{BlockTextEngine, SystemTextEngine, TextEngine};
