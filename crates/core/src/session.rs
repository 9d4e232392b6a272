//! Editor session: the single owner of all editing state
//!
//! Every mutating operation follows the same steps. It snapshots the state
//! and performs the mutation. Only if something changed does it push the
//! snapshot and mark the page dirty.

use crate::annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationStore, ImageData, ShapeData, StrokeStyle,
    TextData,
};
use crate::config::{EditorConfig, TextSettings};
use crate::error::{EditorError, EditorResult};
use crate::export::{self, ExportOptions, ExportSummary};
use crate::geometry::{clamp_zoom, Point, Rect};
use crate::history::{EditorSnapshot, UndoHistory};
use crate::interaction::{
    GestureOutcome, GesturePreview, InteractionMachine, PointerButton, PointerContext,
    PointerResponse, Tool,
};
use crate::render::{display_to_page_device, rotate_image, RenderContext, RenderPipeline};
use crate::script::EditScript;
use crate::text::TextEngine;
use pagemark_cache::CacheStats;
use pagemark_engine::{
    DocumentEngine, DocumentHandle, OpenSource, PageSize, RenderRequest, RgbaImage, Rotation,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct OpenDocument {
    handle: DocumentHandle,
    source: OpenSource,
    page_count: u32,
}

/// Image waiting for a placement click
#[derive(Debug, Clone)]
struct PendingImage {
    data: ImageData,
    width: u32,
    height: u32,
}

pub struct EditorSession<E: DocumentEngine, T: TextEngine> {
    engine: E,
    text: T,
    config: EditorConfig,
    document: Option<OpenDocument>,
    store: AnnotationStore,
    selection: Option<AnnotationId>,
    current_page: u32,
    zoom: f32,
    rotations: BTreeMap<u32, Rotation>,
    pipeline: RenderPipeline,
    history: UndoHistory<EditorSnapshot>,
    interaction: InteractionMachine,
    tool: Tool,
    stroke: StrokeStyle,
    text_settings: TextSettings,
    clipboard: Option<Annotation>,
    pending_image: Option<PendingImage>,
}

impl<E: DocumentEngine, T: TextEngine> EditorSession<E, T> {
    pub fn new(engine: E, text: T, config: EditorConfig) -> Self {
        let initial = EditorSnapshot {
            annotations: AnnotationStore::new(),
            current_page: 0,
            rotations: BTreeMap::new(),
            selected: None,
            label: "empty".to_owned(),
        };
        Self {
            engine,
            text,
            document: None,
            store: AnnotationStore::new(),
            selection: None,
            current_page: 0,
            zoom: clamp_zoom(config.initial_zoom),
            rotations: BTreeMap::new(),
            pipeline: RenderPipeline::new(config.cache_capacity, config.compose_style()),
            history: UndoHistory::new(initial, config.undo_depth),
            interaction: InteractionMachine::new(config.interaction()),
            tool: Tool::default(),
            stroke: config.stroke,
            text_settings: config.text.clone(),
            clipboard: None,
            pending_image: None,
            config,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ---------------------------------------------------------------
    // Document
    // ---------------------------------------------------------------

    /// Open a document, replacing any open one. Returns the page count.
    pub fn open(&mut self, source: impl Into<OpenSource>) -> EditorResult<u32> {
        let source = source.into();
        let handle = self.engine.open(source.clone())?;
        let page_count = match self.read_rotations(handle) {
            Ok(page_count) => page_count,
            Err(err) => {
                let _ = self.engine.close(handle);
                return Err(err);
            }
        };

        if let Some(previous) = self.document.take() {
            if let Err(err) = self.engine.close(previous.handle) {
                log::warn!("failed to close previous document: {err}");
            }
        }

        self.document = Some(OpenDocument { handle, source, page_count });
        self.reset_edits();
        log::info!("session opened document with {page_count} page(s)");
        Ok(page_count)
    }

    fn read_rotations(&mut self, handle: DocumentHandle) -> EditorResult<u32> {
        let page_count = self.engine.page_count(handle)?;
        let mut rotations = BTreeMap::new();
        for page in 0..page_count {
            rotations.insert(page, self.engine.rotation(handle, page)?);
        }
        self.rotations = rotations;
        Ok(page_count)
    }

    fn reset_edits(&mut self) {
        self.store.clear();
        self.selection = None;
        self.current_page = 0;
        self.clipboard = None;
        self.pending_image = None;
        self.interaction.cancel();
        self.pipeline.clear();
        let initial = self.snapshot("open");
        self.history.reset(initial);
    }

    /// Close the document and drop every edit
    pub fn close(&mut self) -> EditorResult<()> {
        let document = self.document.take().ok_or(EditorError::NoDocument)?;
        self.rotations.clear();
        self.reset_edits();
        self.engine.close(document.handle)?;
        Ok(())
    }

    /// Re-open the current source, discarding unsaved edits
    pub fn reload(&mut self) -> EditorResult<u32> {
        let source = self.document()?.source.clone();
        self.open(source)
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    fn document(&self) -> EditorResult<&OpenDocument> {
        self.document.as_ref().ok_or(EditorError::NoDocument)
    }

    fn handle(&self) -> EditorResult<DocumentHandle> {
        Ok(self.document()?.handle)
    }

    pub fn page_count(&self) -> EditorResult<u32> {
        Ok(self.document()?.page_count)
    }

    pub fn page_size(&self, page_index: u32) -> EditorResult<PageSize> {
        Ok(self.engine.page_size(self.handle()?, page_index)?)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn go_to_page(&mut self, page_index: u32) -> EditorResult<()> {
        let page_count = self.page_count()?;
        if page_index >= page_count {
            return Err(EditorError::PageOutOfRange { page: page_index, page_count });
        }
        if page_index != self.current_page {
            self.current_page = page_index;
            self.selection = None;
            self.interaction.cancel();
        }
        Ok(())
    }

    /// Returns `false` on the last page
    pub fn next_page(&mut self) -> EditorResult<bool> {
        let page_count = self.page_count()?;
        if self.current_page + 1 >= page_count {
            return Ok(false);
        }
        self.go_to_page(self.current_page + 1)?;
        Ok(true)
    }

    /// Returns `false` on the first page
    pub fn prev_page(&mut self) -> EditorResult<bool> {
        self.document()?;
        if self.current_page == 0 {
            return Ok(false);
        }
        self.go_to_page(self.current_page - 1)?;
        Ok(true)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = clamp_zoom(zoom);
        if zoom != self.zoom {
            self.zoom = zoom;
            self.interaction.cancel();
            self.pipeline.clear();
        }
    }

    pub fn rotation(&self, page_index: u32) -> Rotation {
        self.rotations.get(&page_index).copied().unwrap_or_default()
    }

    pub fn rotations(&self) -> &BTreeMap<u32, Rotation> {
        &self.rotations
    }

    /// Turn the current page a quarter clockwise
    pub fn rotate_current_page(&mut self) -> EditorResult<Rotation> {
        let handle = self.handle()?;
        let page = self.current_page;
        let rotation = self.rotation(page).clockwise();
        let snapshot = self.snapshot("rotate page");

        self.engine.set_rotation(handle, page, rotation)?;
        self.history.push(snapshot);
        self.rotations.insert(page, rotation);
        self.interaction.cancel();
        self.pipeline.mark_dirty(page);
        log::debug!("page {page} rotated to {}", rotation.degrees());
        Ok(rotation)
    }

    // ---------------------------------------------------------------
    // Tools and pointer input
    // ---------------------------------------------------------------

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.interaction.cancel();
    }

    pub fn stroke(&self) -> StrokeStyle {
        self.stroke
    }

    pub fn set_stroke(&mut self, stroke: StrokeStyle) {
        self.stroke = stroke;
    }

    pub fn text_settings(&self) -> &TextSettings {
        &self.text_settings
    }

    pub fn set_text_settings(&mut self, settings: TextSettings) {
        self.text_settings = settings;
    }

    /// Map a point on the displayed (rotated) page to unrotated device space
    fn page_device_point(&self, display: Point) -> EditorResult<Point> {
        let size = self.page_size(self.current_page)?;
        Ok(display_to_page_device(
            display,
            self.rotation(self.current_page),
            size.width_pt * self.zoom,
            size.height_pt * self.zoom,
        ))
    }

    /// Pointer press at a point of the displayed page
    pub fn pointer_down(&mut self, display: Point, button: PointerButton) -> EditorResult<PointerResponse> {
        let point = self.page_device_point(display)?;
        let context = PointerContext {
            store: &self.store,
            page_index: self.current_page,
            zoom: self.zoom,
            selection: self.selection,
            tool: self.tool,
        };
        let response = self.interaction.pointer_down(context, point, button);

        match response {
            PointerResponse::None => {}
            PointerResponse::Selected(id) => self.selection = Some(id),
            PointerResponse::SelectionCleared => self.selection = None,
            PointerResponse::PlaceImage(at) => {
                self.insert_image_at(at)?;
            }
        }
        Ok(response)
    }

    pub fn pointer_move(&mut self, display: Point) -> EditorResult<()> {
        let point = self.page_device_point(display)?;
        self.interaction.pointer_move(point);
        Ok(())
    }

    /// Pointer release; applies the finished gesture, if any
    pub fn pointer_up(&mut self, display: Point) -> EditorResult<Option<GestureOutcome>> {
        let point = self.page_device_point(display)?;
        let Some(outcome) = self.interaction.pointer_up(point, self.zoom) else {
            return Ok(None);
        };
        let applied = self.apply_outcome(&outcome);
        Ok(applied.then_some(outcome))
    }

    fn apply_outcome(&mut self, outcome: &GestureOutcome) -> bool {
        let page = self.current_page;
        match outcome {
            GestureOutcome::Create { tool, device_bounds, geometry } => {
                let shape = ShapeData { geometry: geometry.clone(), stroke: self.stroke };
                let body = match tool {
                    Tool::Frame => AnnotationBody::Frame(shape),
                    _ => AnnotationBody::Shape(shape),
                };
                let snapshot = self.snapshot("create");
                let created = if *tool == Tool::Freehand {
                    let bounds = device_bounds.to_document(self.zoom);
                    Some(self.store.insert(Annotation::new(page, bounds, body)))
                } else {
                    self.store.create(page, *device_bounds, self.zoom, self.config.min_gesture_size, body)
                };
                match created {
                    Some(id) => {
                        self.commit(snapshot, page);
                        self.selection = Some(id);
                        true
                    }
                    None => false,
                }
            }
            GestureOutcome::Move { id, dx, dy } => {
                let snapshot = self.snapshot("move");
                self.store.translate(*id, *dx, *dy) && self.commit(snapshot, page)
            }
            GestureOutcome::Resize { id, bounds } => {
                let snapshot = self.snapshot("resize");
                self.store.resize(*id, *bounds) && self.commit(snapshot, page)
            }
        }
    }

    /// Record a completed mutation of `page`
    fn commit(&mut self, snapshot: EditorSnapshot, page: u32) -> bool {
        log::debug!("{} on page {page}", snapshot.label);
        self.history.push(snapshot);
        self.pipeline.mark_dirty(page);
        true
    }

    /// Outline of the gesture in progress, in unrotated device space
    pub fn gesture_preview(&self) -> Option<GesturePreview> {
        self.interaction.preview()
    }

    // ---------------------------------------------------------------
    // Selection and editing
    // ---------------------------------------------------------------

    pub fn selection(&self) -> Option<&Annotation> {
        self.selection.and_then(|id| self.store.get(id))
    }

    /// Select `id` if it exists
    pub fn select(&mut self, id: AnnotationId) -> bool {
        let exists = self.store.contains(id);
        if exists {
            self.selection = Some(id);
        }
        exists
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    fn selected(&mut self) -> EditorResult<&Annotation> {
        if !self.selection.is_some_and(|id| self.store.contains(id)) {
            self.selection = None;
        }
        self.selection.and_then(|id| self.store.get(id)).ok_or(EditorError::NothingSelected)
    }

    pub fn delete_selected(&mut self) -> EditorResult<Annotation> {
        let (id, page) = {
            let selected = self.selected()?;
            (selected.id(), selected.page_index())
        };
        let snapshot = self.snapshot("delete");
        let removed = self.store.delete(id).ok_or(EditorError::NothingSelected)?;
        self.commit(snapshot, page);
        self.selection = None;
        Ok(removed)
    }

    /// Copy of the selection on the current page, offset down and right
    pub fn duplicate_selected(&mut self) -> EditorResult<AnnotationId> {
        let id = self.selected()?.id();
        let page = self.current_page;
        let offset = self.config.duplicate_offset / self.zoom;
        let snapshot = self.snapshot("duplicate");
        let copy = self.store.duplicate(id, offset, page).ok_or(EditorError::NothingSelected)?;
        self.commit(snapshot, page);
        self.selection = Some(copy);
        Ok(copy)
    }

    pub fn copy_selected(&mut self) -> EditorResult<()> {
        let copied = self.selected()?.clone();
        self.clipboard = Some(copied);
        Ok(())
    }

    /// Paste the clipboard onto the current page, offset like a duplicate
    pub fn paste(&mut self) -> EditorResult<AnnotationId> {
        self.document()?;
        let page = self.current_page;
        let offset = self.config.duplicate_offset / self.zoom;
        let copy = self
            .clipboard
            .as_ref()
            .map(|annotation| annotation.duplicate(offset, page))
            .ok_or(EditorError::NothingSelected)?;
        let snapshot = self.snapshot("paste");
        let id = self.store.insert(copy);
        self.commit(snapshot, page);
        self.selection = Some(id);
        Ok(id)
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.is_some()
    }

    /// Replace the selection's payload
    pub fn reclassify_selected(&mut self, body: AnnotationBody) -> EditorResult<()> {
        let (id, page) = {
            let selected = self.selected()?;
            (selected.id(), selected.page_index())
        };
        let label = format!("reclassify as {:?}", body.kind());
        let snapshot = self.snapshot(&label);
        if !self.store.reclassify(id, body) {
            return Err(EditorError::NothingSelected);
        }
        self.commit(snapshot, page);
        Ok(())
    }

    pub fn apply_redaction(&mut self) -> EditorResult<()> {
        self.reclassify_selected(AnnotationBody::Redaction)
    }

    pub fn apply_black_mask(&mut self) -> EditorResult<()> {
        self.reclassify_selected(AnnotationBody::MaskBlack)
    }

    pub fn apply_white_mask(&mut self) -> EditorResult<()> {
        self.reclassify_selected(AnnotationBody::MaskWhite)
    }

    /// Turn the selection into rendered text using the current text settings
    pub fn apply_text(&mut self, text: &str) -> EditorResult<()> {
        if text.trim().is_empty() {
            return Err(EditorError::EmptyText);
        }
        let settings = &self.text_settings;
        let body = AnnotationBody::TextImage(TextData {
            text: text.to_owned(),
            font_size: settings.font_size,
            font_family: settings.font_family.clone(),
            bold: settings.bold,
            color: settings.color(),
        });
        self.reclassify_selected(body)
    }

    /// Stage encoded image bytes for the next placement click
    ///
    /// Switches to the insert-image tool. Returns the pixel size.
    pub fn set_pending_image(&mut self, bytes: Vec<u8>) -> EditorResult<(u32, u32)> {
        let decoded = image::load_from_memory(&bytes)?;
        let (width, height) = (decoded.width(), decoded.height());
        self.pending_image = Some(PendingImage { data: ImageData::new(bytes), width, height });
        self.set_tool(Tool::InsertImage);
        Ok((width, height))
    }

    /// Place the pending image with its top-left corner at `at` (document space)
    pub fn insert_image_at(&mut self, at: Point) -> EditorResult<AnnotationId> {
        let page = self.current_page;
        let page_width = self.page_size(page)?.width_pt;
        let pending = self.pending_image.as_ref().ok_or(EditorError::NoPendingImage)?;

        let width = (pending.width as f32 * self.config.image_scale).min(page_width / 2.0).max(1.0);
        let aspect = if pending.width > 0 { pending.height as f32 / pending.width as f32 } else { 1.0 };
        let bounds = Rect::new(at.x, at.y, at.x + width, at.y + (width * aspect).max(1.0));
        let annotation = Annotation::new(page, bounds, AnnotationBody::ImageObject(pending.data.clone()));

        let snapshot = self.snapshot("insert image");
        let id = self.store.insert(annotation);
        self.commit(snapshot, page);
        self.pending_image = None;
        self.set_tool(Tool::Select);
        self.selection = Some(id);
        Ok(id)
    }

    /// Annotations of a page in insertion order
    pub fn annotations(&self, page_index: u32) -> &[Annotation] {
        self.store.page(page_index)
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Add the annotations and rotations of a script as one undoable step
    pub fn apply_script(&mut self, script: &EditScript) -> EditorResult<usize> {
        let page_count = self.page_count()?;
        let rotations = script.page_rotations()?;
        if let Some(annotation) = script.annotations.iter().find(|a| a.page_index() >= page_count) {
            return Err(EditorError::PageOutOfRange { page: annotation.page_index(), page_count });
        }
        if let Some(page) = rotations.keys().find(|page| **page >= page_count) {
            return Err(EditorError::PageOutOfRange { page: *page, page_count });
        }

        let snapshot = self.snapshot("apply script");
        self.sync_rotations(&rotations)?;
        self.history.push(snapshot);
        for (page, rotation) in rotations {
            self.rotations.insert(page, rotation);
            self.pipeline.mark_dirty(page);
        }
        for annotation in &script.annotations {
            self.pipeline.mark_dirty(annotation.page_index());
            self.store.insert(annotation.clone());
        }
        Ok(script.annotations.len())
    }

    /// Current edits as a script
    pub fn edit_script(&self) -> EditScript {
        EditScript::from_state(&self.store, &self.rotations)
    }

    // ---------------------------------------------------------------
    // Undo
    // ---------------------------------------------------------------

    fn snapshot(&self, label: &str) -> EditorSnapshot {
        EditorSnapshot {
            annotations: self.store.clone(),
            current_page: self.current_page,
            rotations: self.rotations.clone(),
            selected: self.selection,
            label: label.to_owned(),
        }
    }

    /// Push `target` rotations to the engine. When one page fails, the pages
    /// already changed are turned back before the error is returned.
    fn sync_rotations(&mut self, target: &BTreeMap<u32, Rotation>) -> EditorResult<()> {
        let Some(handle) = self.document.as_ref().map(|document| document.handle) else {
            return Ok(());
        };

        let mut applied = Vec::new();
        for (page, rotation) in target {
            let previous = self.rotation(*page);
            if previous == *rotation {
                continue;
            }
            if let Err(err) = self.engine.set_rotation(handle, *page, *rotation) {
                for (page, previous) in applied.into_iter().rev() {
                    if let Err(revert) = self.engine.set_rotation(handle, page, previous) {
                        log::warn!("page {page}: failed to turn rotation back: {revert}");
                    }
                }
                return Err(err.into());
            }
            applied.push((*page, previous));
        }
        Ok(())
    }

    fn restore(&mut self, snapshot: EditorSnapshot) {
        self.store = snapshot.annotations;
        self.current_page = snapshot.current_page;
        self.rotations = snapshot.rotations;
        self.selection = snapshot.selected.filter(|id| self.store.contains(*id));
        self.interaction.cancel();
        self.pipeline.mark_all_dirty();
        log::debug!("restored snapshot taken before {}", snapshot.label);
    }

    /// Returns `false` when there is nothing to undo
    pub fn undo(&mut self) -> EditorResult<bool> {
        let current = self.snapshot("redo");
        let Some(previous) = self.history.undo(current) else {
            return Ok(false);
        };
        if let Err(err) = self.sync_rotations(&previous.rotations) {
            // Step the history back so it still matches the unchanged state.
            self.history.redo(previous);
            return Err(err);
        }
        self.restore(previous);
        Ok(true)
    }

    /// Returns `false` when there is nothing to redo
    pub fn redo(&mut self) -> EditorResult<bool> {
        let current = self.snapshot("undo");
        let Some(next) = self.history.redo(current) else {
            return Ok(false);
        };
        if let Err(err) = self.sync_rotations(&next.rotations) {
            self.history.undo(next);
            return Err(err);
        }
        self.restore(next);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---------------------------------------------------------------
    // Rendering and export
    // ---------------------------------------------------------------

    /// Composited current page
    pub fn render(&mut self) -> EditorResult<Arc<RgbaImage>> {
        self.render_page(self.current_page)
    }

    pub fn render_page(&mut self, page_index: u32) -> EditorResult<Arc<RgbaImage>> {
        let handle = self.handle()?;
        let rotation = self.rotation(page_index);
        let context =
            RenderContext { engine: &self.engine, handle, store: &self.store, text: &mut self.text };
        Ok(self.pipeline.render(context, page_index, self.zoom, rotation)?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.pipeline.stats()
    }

    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            raster_scale: self.config.export_raster_scale,
            redaction_fill: self.config.redaction_fill,
        }
    }

    /// Serialized document with every edit baked in
    pub fn export(&mut self) -> EditorResult<Vec<u8>> {
        self.export_with_summary().map(|(bytes, _)| bytes)
    }

    pub fn export_with_summary(&mut self) -> EditorResult<(Vec<u8>, ExportSummary)> {
        let handle = self.handle()?;
        let options = self.export_options();
        export::export(&self.engine, handle, &self.store, &self.rotations, &mut self.text, &options)
    }

    /// Export to `path` through a temporary file in the same directory
    pub fn export_to(&mut self, path: &Path) -> EditorResult<ExportSummary> {
        let (bytes, summary) = self.export_with_summary()?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(directory)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;
        log::info!("wrote {}", path.display());
        Ok(summary)
    }

    /// Rasterize a page of the exported document at the current zoom
    pub fn preview_export(&mut self, page_index: u32) -> EditorResult<RgbaImage> {
        let bytes = self.export()?;
        let handle = self.engine.open(OpenSource::Bytes(bytes))?;
        let rendered = self
            .engine
            .rotation(handle, page_index)
            .and_then(|rotation| {
                let request = RenderRequest { page_index, scale: self.zoom };
                Ok(rotate_image(self.engine.render_page(handle, request)?, rotation))
            });
        self.engine.close(handle)?;
        Ok(rendered?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::text::BlockTextEngine;
    use pagemark_engine::sample::SampleDocument;
    use pagemark_engine::{LopdfEngine, PdfEngineError};

    fn session_with_pages(pages: usize) -> EditorSession<LopdfEngine, BlockTextEngine> {
        let mut document = SampleDocument::new();
        for _ in 0..pages {
            document = document.page(300.0, 200.0);
        }
        let bytes = document.build().expect("sample");
        let config = EditorConfig { initial_zoom: 1.0, ..EditorConfig::default() };
        let mut session = EditorSession::new(LopdfEngine::new(), BlockTextEngine, config);
        session.open(bytes).expect("open");
        session
    }

    fn draw(session: &mut EditorSession<LopdfEngine, BlockTextEngine>, from: (f32, f32), to: (f32, f32)) {
        session.pointer_down(Point::new(from.0, from.1), PointerButton::Primary).expect("down");
        session.pointer_move(Point::new(to.0, to.1)).expect("move");
        session.pointer_up(Point::new(to.0, to.1)).expect("up");
    }

    #[test]
    fn test_operations_need_a_document() {
        let mut session = EditorSession::new(LopdfEngine::new(), BlockTextEngine, EditorConfig::default());

        assert!(matches!(session.page_count(), Err(EditorError::NoDocument)));
        assert!(matches!(session.render(), Err(EditorError::NoDocument)));
        assert!(matches!(session.close(), Err(EditorError::NoDocument)));
    }

    #[test]
    fn test_drawing_creates_selected_frame() {
        let mut session = session_with_pages(1);
        draw(&mut session, (10.0, 10.0), (110.0, 60.0));

        let selected = session.selection().expect("new frame is selected");
        assert_eq!(selected.kind(), AnnotationKind::Frame);
        assert_eq!(selected.bounds(), Rect::new(10.0, 10.0, 110.0, 60.0));
        assert!(session.can_undo());
    }

    #[test]
    fn test_rejected_gesture_pushes_nothing() {
        let mut session = session_with_pages(1);
        draw(&mut session, (10.0, 10.0), (12.0, 60.0));

        assert!(session.annotations(0).is_empty());
        assert!(!session.can_undo());
    }

    #[test]
    fn test_reclassify_without_selection() {
        let mut session = session_with_pages(1);
        assert!(matches!(session.apply_redaction(), Err(EditorError::NothingSelected)));
        assert!(matches!(session.delete_selected(), Err(EditorError::NothingSelected)));
        assert!(!session.can_undo());
    }

    #[test]
    fn test_duplicate_respects_zoom() {
        let mut session = session_with_pages(1);
        session.set_zoom(2.0);
        draw(&mut session, (0.0, 0.0), (100.0, 100.0));

        let copy = session.duplicate_selected().expect("duplicate");
        let bounds = session.store().get(copy).map(Annotation::bounds);
        assert_eq!(bounds, Some(Rect::new(5.0, 5.0, 55.0, 55.0)));
    }

    #[test]
    fn test_copy_paste_onto_other_page() {
        let mut session = session_with_pages(2);
        draw(&mut session, (0.0, 0.0), (50.0, 50.0));
        session.copy_selected().expect("copy");
        session.next_page().expect("next");

        let id = session.paste().expect("paste");
        let pasted = session.store().get(id).expect("pasted");
        assert_eq!(pasted.page_index(), 1);
        assert_eq!(pasted.bounds(), Rect::new(10.0, 10.0, 60.0, 60.0));
        assert_eq!(session.annotations(0).len(), 1);
    }

    #[test]
    fn test_navigation_bounds() {
        let mut session = session_with_pages(2);
        assert!(!session.prev_page().expect("prev"));
        assert!(session.next_page().expect("next"));
        assert!(!session.next_page().expect("next"));
        assert!(matches!(
            session.go_to_page(5),
            Err(EditorError::PageOutOfRange { page: 5, page_count: 2 })
        ));
    }

    #[test]
    fn test_rotation_is_undoable() {
        let mut session = session_with_pages(1);
        assert_eq!(session.rotate_current_page().expect("rotate"), Rotation::Deg90);
        let handle = session.handle().expect("open");
        assert_eq!(session.engine().rotation(handle, 0).expect("rotation"), Rotation::Deg90);

        assert!(session.undo().expect("undo"));
        assert_eq!(session.rotation(0), Rotation::Deg0);
        assert_eq!(session.engine().rotation(handle, 0).expect("rotation"), Rotation::Deg0);

        assert!(session.redo().expect("redo"));
        assert_eq!(session.engine().rotation(handle, 0).expect("rotation"), Rotation::Deg90);
    }

    #[test]
    fn test_pointer_on_rotated_page() {
        let mut session = session_with_pages(1);
        session.rotate_current_page().expect("rotate");
        // Displayed page is 200 wide and 300 tall; its top-right corner is the
        // unrotated top-left corner.
        draw(&mut session, (190.0, 0.0), (150.0, 60.0));

        let bounds = session.selection().map(Annotation::bounds);
        assert_eq!(bounds, Some(Rect::new(0.0, 10.0, 60.0, 50.0)));
    }

    #[test]
    fn test_undo_restores_selection_when_present() {
        let mut session = session_with_pages(1);
        draw(&mut session, (0.0, 0.0), (50.0, 50.0));
        let id = session.selection().map(Annotation::id).expect("selected");
        session.apply_black_mask().expect("mask");
        session.delete_selected().expect("delete");

        assert!(session.undo().expect("undo delete"));
        assert_eq!(session.selection().map(Annotation::id), Some(id));
        assert_eq!(session.selection().map(Annotation::kind), Some(AnnotationKind::MaskBlack));
    }

    #[test]
    fn test_apply_text_uses_settings() {
        let mut session = session_with_pages(1);
        draw(&mut session, (0.0, 0.0), (100.0, 40.0));
        session.set_text_settings(TextSettings { density: 0, ..TextSettings::default() });

        assert!(matches!(session.apply_text("  "), Err(EditorError::EmptyText)));
        session.apply_text("Hello").expect("text");
        match session.selection().map(Annotation::body) {
            Some(AnnotationBody::TextImage(data)) => {
                assert_eq!(data.text, "Hello");
                assert_eq!(data.color.to_hex(), "#ffffff");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_pending_image_placement() {
        let mut session = session_with_pages(1);
        let mut png = std::io::Cursor::new(Vec::new());
        RgbaImage::new(1000, 500).write_to(&mut png, image::ImageFormat::Png).expect("encode");

        assert_eq!(session.set_pending_image(png.into_inner()).expect("decodes"), (1000, 500));
        assert_eq!(session.tool(), Tool::InsertImage);
        let response = session.pointer_down(Point::new(20.0, 30.0), PointerButton::Primary).expect("down");
        assert_eq!(response, PointerResponse::PlaceImage(Point::new(20.0, 30.0)));

        // 1000 px * 0.3 exceeds half the page width, so the width is capped at 150
        let placed = session.selection().expect("placed image is selected");
        assert_eq!(placed.kind(), AnnotationKind::ImageObject);
        assert_eq!(placed.bounds(), Rect::new(20.0, 30.0, 170.0, 105.0));
        assert!(matches!(session.insert_image_at(Point::new(0.0, 0.0)), Err(EditorError::NoPendingImage)));
        assert!(session.set_pending_image(b"nope".to_vec()).is_err());
    }

    #[test]
    fn test_click_after_image_placement_selects_normally() {
        let mut session = session_with_pages(1);
        let mut png = std::io::Cursor::new(Vec::new());
        RgbaImage::new(40, 20).write_to(&mut png, image::ImageFormat::Png).expect("encode");
        session.set_pending_image(png.into_inner()).expect("decodes");
        session.pointer_down(Point::new(20.0, 30.0), PointerButton::Primary).expect("place");
        session.pointer_up(Point::new(20.0, 30.0)).expect("up");
        assert_eq!(session.tool(), Tool::Select);

        let response = session.pointer_down(Point::new(250.0, 180.0), PointerButton::Primary).expect("click");
        assert_eq!(response, PointerResponse::SelectionCleared);
        assert!(session.selection().is_none());
        assert_eq!(session.annotations(0).len(), 1);
    }

    #[test]
    fn test_script_with_out_of_range_rotation_changes_nothing() {
        let mut session = session_with_pages(2);
        draw(&mut session, (10.0, 10.0), (60.0, 60.0));
        let store = session.store().clone();
        let undo_len = session.history.undo_len();

        let mut script = EditScript::default();
        script.annotations.push(Annotation::new(0, Rect::new(0.0, 0.0, 5.0, 5.0), AnnotationBody::MaskBlack));
        script.rotations.insert(0, 90);
        script.rotations.insert(5, 90);
        assert!(matches!(
            session.apply_script(&script),
            Err(EditorError::PageOutOfRange { page: 5, page_count: 2 })
        ));

        let handle = session.handle().expect("open");
        assert_eq!(session.engine().rotation(handle, 0).expect("rotation"), Rotation::Deg0);
        assert_eq!(session.rotation(0), Rotation::Deg0);
        assert_eq!(session.store(), &store);
        assert_eq!(session.history.undo_len(), undo_len);
    }

    #[test]
    fn test_failed_rotation_sync_turns_earlier_pages_back() {
        let mut session = session_with_pages(2);
        let target = BTreeMap::from([(0, Rotation::Deg90), (1, Rotation::Deg180), (5, Rotation::Deg270)]);

        assert!(matches!(
            session.sync_rotations(&target),
            Err(EditorError::Engine(PdfEngineError::PageOutOfRange { page: 5, .. }))
        ));
        let handle = session.handle().expect("open");
        assert_eq!(session.engine().rotation(handle, 0).expect("rotation"), Rotation::Deg0);
        assert_eq!(session.engine().rotation(handle, 1).expect("rotation"), Rotation::Deg0);
    }

    #[test]
    fn test_zoom_change_clears_cache() {
        let mut session = session_with_pages(1);
        session.render().expect("render");
        session.render().expect("render");
        assert_eq!(session.cache_stats().hits, 1);

        session.set_zoom(0.5);
        let image = session.render().expect("render");
        assert_eq!(image.dimensions(), (150, 100));
        assert_eq!(session.cache_stats().entry_count, 1);
    }

    #[test]
    fn test_export_to_writes_file() {
        let mut session = session_with_pages(1);
        draw(&mut session, (10.0, 10.0), (60.0, 60.0));
        session.apply_white_mask().expect("mask");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.pdf");
        let summary = session.export_to(&path).expect("export");

        assert_eq!(summary.overlays, 1);
        let written = std::fs::read(&path).expect("written");
        assert!(written.starts_with(b"%PDF"));
    }

    #[test]
    fn test_reload_discards_edits() {
        let mut session = session_with_pages(1);
        draw(&mut session, (10.0, 10.0), (60.0, 60.0));
        session.reload().expect("reload");

        assert!(session.annotations(0).is_empty());
        assert!(!session.can_undo());
    }
}
