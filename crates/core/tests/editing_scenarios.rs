use pagemark_core::render::{display_to_page_device, page_device_to_display};
use pagemark_core::{
    Annotation, AnnotationBody, AnnotationKind, AnnotationStore, BlockTextEngine, Color,
    EditScript, EditorConfig, EditorSession, Point, PointerButton, Rect, ShapeData, ShapeGeometry,
    StrokeStyle, TextData, Tool,
};
use pagemark_engine::sample::SampleDocument;
use pagemark_engine::{LopdfEngine, Rotation};
use std::sync::Arc;

type Session = EditorSession<LopdfEngine, BlockTextEngine>;

fn session_for(bytes: Vec<u8>) -> Session {
    let config = EditorConfig { initial_zoom: 1.0, ..EditorConfig::default() };
    let mut session = EditorSession::new(LopdfEngine::new(), BlockTextEngine, config);
    session.open(bytes).expect("sample should open");
    session
}

fn blank_session() -> Session {
    session_for(SampleDocument::new().page(200.0, 200.0).page(200.0, 200.0).build().expect("sample"))
}

fn drag(session: &mut Session, from: (f32, f32), to: (f32, f32)) {
    session.pointer_down(Point::new(from.0, from.1), PointerButton::Primary).expect("down");
    session.pointer_move(Point::new(to.0, to.1)).expect("move");
    session.pointer_up(Point::new(to.0, to.1)).expect("up");
}

fn rgb(image: &pagemark_engine::RgbaImage, x: u32, y: u32) -> [u8; 3] {
    let [r, g, b, _] = image.get_pixel(x, y).0;
    [r, g, b]
}

#[test]
fn coordinate_transforms_round_trip() {
    let rects = [
        Rect::new(0.0, 0.0, 1.0, 1.0),
        Rect::new(10.5, 20.25, 110.0, 60.75),
        Rect::new(-5.0, 3.0, 400.0, 900.0),
    ];
    for zoom in [0.01, 0.33, 0.8, 1.0, 2.5, 7.0] {
        for rect in rects {
            let back = rect.to_device(zoom).to_document(zoom);
            assert!((back.x0 - rect.x0).abs() < 1e-3, "{rect:?} at {zoom}");
            assert!((back.y0 - rect.y0).abs() < 1e-3, "{rect:?} at {zoom}");
            assert!((back.x1 - rect.x1).abs() < 1e-3, "{rect:?} at {zoom}");
            assert!((back.y1 - rect.y1).abs() < 1e-3, "{rect:?} at {zoom}");
        }
    }

    let point = Point::new(12.0, 34.0);
    for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
        let display = page_device_to_display(point, rotation, 300.0, 200.0);
        assert_eq!(display_to_page_device(display, rotation, 300.0, 200.0), point);
    }
}

#[test]
fn paint_order_follows_kind_tiers() {
    let mut session = blank_session();
    let text = TextData {
        text: "I".to_owned(),
        font_size: 100.0,
        font_family: "gothic".to_owned(),
        bold: false,
        color: Color::RED,
    };
    let blue = StrokeStyle { color: Color::rgb(0, 0, 255), width: 2.0 };
    // Inserted top tier first so insertion order alone would paint them wrong.
    let script = EditScript {
        annotations: vec![
            Annotation::new(0, Rect::new(20.0, 20.0, 80.0, 80.0), AnnotationBody::TextImage(text)),
            Annotation::new(
                0,
                Rect::new(20.0, 20.0, 80.0, 80.0),
                AnnotationBody::Shape(ShapeData { geometry: ShapeGeometry::Rectangle, stroke: blue }),
            ),
            Annotation::new(0, Rect::new(10.0, 10.0, 90.0, 90.0), AnnotationBody::MaskBlack),
            Annotation::new(0, Rect::new(0.0, 0.0, 100.0, 100.0), AnnotationBody::Redaction),
        ],
        ..EditScript::default()
    };
    session.apply_script(&script).expect("script");

    let image = session.render().expect("render");
    assert_eq!(rgb(&image, 25, 50), [255, 0, 0], "text paints over everything");
    assert_eq!(rgb(&image, 80, 50), [0, 0, 255], "shape paints over the mask");
    assert_eq!(rgb(&image, 70, 50), [0, 0, 0], "mask paints over the redaction");
    assert_eq!(rgb(&image, 95, 50), [211, 211, 211], "redaction fill");
    assert_eq!(rgb(&image, 150, 150), [255, 255, 255], "untouched page");
}

#[test]
fn tiny_gesture_creates_nothing() {
    let mut session = blank_session();
    drag(&mut session, (50.0, 50.0), (54.0, 90.0));

    assert!(session.annotations(0).is_empty());
    assert!(!session.can_undo());
}

#[test]
fn resize_scales_line_endpoints() {
    let mut store = AnnotationStore::new();
    let line = ShapeGeometry::Line { start: Point::new(0.0, 0.0), end: Point::new(100.0, 0.0) };
    let id = store.insert(Annotation::new(
        0,
        Rect::new(0.0, 0.0, 100.0, 0.0),
        AnnotationBody::Shape(ShapeData { geometry: line, stroke: StrokeStyle::default() }),
    ));

    assert!(store.resize(id, Rect::new(0.0, 0.0, 200.0, 0.0)));
    match store.get(id).map(Annotation::body) {
        Some(AnnotationBody::Shape(ShapeData { geometry: ShapeGeometry::Line { start, end }, .. })) => {
            assert_eq!(*start, Point::new(0.0, 0.0));
            assert_eq!(*end, Point::new(200.0, 0.0));
        }
        other => panic!("unexpected body {other:?}"),
    }
}

#[test]
fn undoing_every_operation_restores_the_start() {
    let mut session = blank_session();
    let start = session.store().clone();

    drag(&mut session, (10.0, 10.0), (110.0, 60.0));
    session.apply_black_mask().expect("mask");
    session.duplicate_selected().expect("duplicate");
    session.rotate_current_page().expect("rotate");
    session.set_tool(Tool::Oval);
    drag(&mut session, (150.0, 150.0), (190.0, 190.0));
    session.delete_selected().expect("delete");
    let operations = 6;

    for _ in 0..operations {
        assert!(session.undo().expect("undo"));
    }
    assert!(!session.can_undo());
    assert_eq!(session.store(), &start);
    assert_eq!(session.rotation(0), Rotation::Deg0);

    for _ in 0..operations {
        assert!(session.redo().expect("redo"));
    }
    assert_eq!(session.store().len(), 2);
    assert_eq!(session.rotation(0), Rotation::Deg90);
}

#[test]
fn rerender_differs_only_in_the_edited_region() {
    let bytes = SampleDocument::new()
        .page(200.0, 200.0)
        .text(20.0, 40.0, 12.0, "Heading")
        .fill_box(120.0, 120.0, 180.0, 180.0, [0, 128, 0])
        .build()
        .expect("sample");
    let mut session = session_for(bytes);

    let first = session.render().expect("render");
    let second = session.render().expect("render");
    assert!(Arc::ptr_eq(&first, &second), "clean page is served from the cache");

    drag(&mut session, (60.0, 60.0), (100.0, 100.0));
    session.apply_black_mask().expect("mask");
    let edited = session.render().expect("render");
    assert!(!Arc::ptr_eq(&first, &edited));

    let region = Rect::new(60.0, 60.0, 100.0, 100.0);
    let mut changed = 0;
    for (x, y, pixel) in edited.enumerate_pixels() {
        let inside = region.contains(Point::new(x as f32 + 0.5, y as f32 + 0.5), 0.0);
        if inside {
            assert_eq!(pixel.0, [0, 0, 0, 255]);
            changed += 1;
        } else {
            assert_eq!(pixel, first.get_pixel(x, y), "pixel ({x}, {y}) outside the mask changed");
        }
    }
    assert_eq!(changed, 40 * 40);
    assert_eq!(session.cache_stats().hits, 1);
}

#[test]
fn redacted_frame_exports_without_the_text() {
    let bytes = SampleDocument::new()
        .page(300.0, 200.0)
        .text(20.0, 40.0, 12.0, "Secret")
        .text(20.0, 150.0, 12.0, "Public")
        .build()
        .expect("sample");
    let mut session = session_for(bytes);

    drag(&mut session, (10.0, 10.0), (110.0, 60.0));
    let frame = session.selection().expect("frame selected");
    assert_eq!(frame.kind(), AnnotationKind::Frame);
    assert_eq!(frame.bounds(), Rect::new(10.0, 10.0, 110.0, 60.0));
    session.apply_redaction().expect("redact");

    let (output, summary) = session.export_with_summary().expect("export");
    assert_eq!(summary.removed_items, 1);
    let contains = |needle: &[u8]| output.windows(needle.len()).any(|window| window == needle);
    assert!(!contains(b"Secret"));
    assert!(contains(b"Public"));

    let preview = session.preview_export(0).expect("preview");
    assert_eq!(rgb(&preview, 50, 35), [211, 211, 211]);
    assert_eq!(rgb(&preview, 250, 100), [255, 255, 255]);
}

#[test]
fn duplicate_lands_offset_on_the_current_page() {
    let mut session = blank_session();
    session.set_tool(Tool::Rectangle);
    drag(&mut session, (0.0, 0.0), (50.0, 50.0));

    let copy = session.duplicate_selected().expect("duplicate");
    let duplicated = session.store().get(copy).expect("copy exists");
    assert_eq!(duplicated.bounds(), Rect::new(10.0, 10.0, 60.0, 60.0));
    assert_eq!(duplicated.page_index(), 0);
    assert_eq!(session.annotations(0).len(), 2);
    assert_eq!(session.selection().map(Annotation::id), Some(copy));
}

#[test]
fn duplicate_from_another_page_lands_on_the_current_page() {
    let mut session = blank_session();
    session.set_tool(Tool::Rectangle);
    drag(&mut session, (0.0, 0.0), (50.0, 50.0));
    let original = session.selection().map(Annotation::id).expect("drawn shape is selected");

    assert!(session.next_page().expect("next page"));
    assert!(session.select(original));
    let copy = session.duplicate_selected().expect("duplicate");

    let duplicated = session.store().get(copy).expect("copy exists");
    assert_eq!(duplicated.page_index(), 1);
    assert_eq!(duplicated.bounds(), Rect::new(10.0, 10.0, 60.0, 60.0));
    assert_eq!(session.annotations(0).len(), 1);
    assert_eq!(session.annotations(1).len(), 1);

    assert!(session.undo().expect("undo"));
    assert!(session.annotations(1).is_empty());
}

#[test]
fn rotated_page_exports_rotated() {
    let mut session = session_for(SampleDocument::new().page(300.0, 200.0).build().expect("sample"));
    session.rotate_current_page().expect("rotate");

    let composite = session.render().expect("render");
    assert_eq!(composite.dimensions(), (200, 300));
    let preview = session.preview_export(0).expect("preview");
    assert_eq!(preview.dimensions(), (200, 300));
}

#[test]
fn edit_script_reapplies_on_a_fresh_session() {
    let mut session = blank_session();
    drag(&mut session, (10.0, 10.0), (60.0, 60.0));
    session.apply_black_mask().expect("mask");
    session.rotate_current_page().expect("rotate");
    let json = session.edit_script().to_json().expect("json");

    let mut fresh = blank_session();
    let script = EditScript::from_json(&json).expect("parse");
    assert_eq!(fresh.apply_script(&script).expect("apply"), 1);
    assert_eq!(fresh.annotations(0), session.annotations(0));
    assert_eq!(fresh.rotation(0), Rotation::Deg90);

    assert!(fresh.undo().expect("undo"));
    assert!(fresh.annotations(0).is_empty());
}
