//! Minimal content-stream interpreter.
//!
//! Walks page operations while tracking the graphics and text state, and
//! groups them into [`Mark`]s: one painted path, one text-showing operation
//! or one XObject invocation each, with its outline and bounding box in PDF
//! user space. The preview rasterizer paints marks and the redaction writer
//! drops the operations of marks that intersect a redaction area.

use crate::{number, resolve};
use lopdf::content::Operation;
use lopdf::{Document, Object};
use std::collections::HashMap;
use std::ops::Range;

/// Horizontal advance of one glyph, as a fraction of the font size.
const GLYPH_ADVANCE: f32 = 0.5;
const DESCENT: f32 = -0.2;
const ASCENT: f32 = 0.8;
/// Top of the band painted for text in previews (x-height).
const INK_TOP: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    fn new(values: [f32; 6]) -> Self {
        let [a, b, c, d, e, f] = values;
        Self { a, b, c, d, e, f }
    }

    fn translate(tx: f32, ty: f32) -> Self {
        Self { e: tx, f: ty, ..Self::IDENTITY }
    }

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Geometric mean scale, used to carry line widths into user space.
    fn scale(&self) -> f32 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }
}

/// Axis-aligned box in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct UserBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl UserBox {
    fn around(points: impl IntoIterator<Item = (f32, f32)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bbox = UserBox { x0: x, y0: y, x1: x, y1: y };
        for (x, y) in iter {
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
        }
        Some(bbox)
    }

    fn expand(self, amount: f32) -> Self {
        UserBox {
            x0: self.x0 - amount,
            y0: self.y0 - amount,
            x1: self.x1 + amount,
            y1: self.y1 + amount,
        }
    }

    /// Closed-interval overlap, so zero-width lines still intersect.
    pub fn intersects(&self, other: &UserBox) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Segment {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CubicTo(f32, f32, f32, f32, f32, f32),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkKind {
    Fill,
    Stroke,
    FillStroke,
    /// Path used only as a clipping boundary.
    Clip,
    Text,
    Image,
    Form,
}

#[derive(Debug, Clone)]
pub(crate) struct Mark {
    /// Operation indices that produce this mark.
    pub ops: Range<usize>,
    pub kind: MarkKind,
    /// Painted geometry in user space.
    pub outline: Vec<Segment>,
    pub bbox: UserBox,
    pub fill: [u8; 3],
    pub stroke: [u8; 3],
    pub line_width: f32,
    pub even_odd: bool,
    /// For text runs, the `TJ` displacement that moves the text position
    /// as far as the run itself does.
    pub shift: Option<f32>,
}

impl Mark {
    /// Clip paths are never removed: dropping one could expose content.
    pub fn is_removable(&self) -> bool {
        self.kind != MarkKind::Clip
    }
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    fill: [u8; 3],
    stroke: [u8; 3],
    line_width: f32,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: [0, 0, 0],
            stroke: [0, 0, 0],
            line_width: 1.0,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            leading: 0.0,
        }
    }
}

/// XObject lookup for `Do`.
pub(crate) struct XObjects<'a> {
    doc: &'a Document,
    dict: Option<&'a lopdf::Dictionary>,
}

impl<'a> XObjects<'a> {
    pub fn from_resources(doc: &'a Document, resources: Option<&'a Object>) -> Self {
        let dict = resources
            .and_then(|res| res.as_dict().ok())
            .and_then(|res| res.get(b"XObject").ok())
            .map(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok());
        Self { doc, dict }
    }

    /// Returns the kind and local-to-user form matrix and bbox for a named XObject.
    fn lookup(&self, name: &[u8]) -> (MarkKind, Option<(Matrix, UserBox)>) {
        let Some(stream) = self
            .dict
            .and_then(|dict| dict.get(name).ok())
            .map(|obj| resolve(self.doc, obj))
            .and_then(|obj| obj.as_stream().ok())
        else {
            return (MarkKind::Image, None);
        };

        let is_form = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form");
        if !is_form {
            return (MarkKind::Image, None);
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| numbers::<6>(array))
            .map(Matrix::new)
            .unwrap_or(Matrix::IDENTITY);
        let bbox = stream
            .dict
            .get(b"BBox")
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| numbers::<4>(array))
            .map(|[x0, y0, x1, y1]| UserBox {
                x0: x0.min(x1),
                y0: y0.min(y1),
                x1: x0.max(x1),
                y1: y0.max(y1),
            });
        (MarkKind::Form, bbox.map(|bbox| (matrix, bbox)))
    }
}

fn numbers<const N: usize>(array: &[Object]) -> Option<[f32; N]> {
    if array.len() != N {
        return None;
    }
    let mut values = [0.0; N];
    for (slot, obj) in values.iter_mut().zip(array) {
        *slot = number(obj)?;
    }
    Some(values)
}

fn operands<const N: usize>(op: &Operation) -> Option<[f32; N]> {
    numbers::<N>(&op.operands)
}

fn to_rgb(components: &[f32]) -> Option<[u8; 3]> {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    match components {
        [gray] => Some([channel(*gray); 3]),
        [r, g, b] => Some([channel(*r), channel(*g), channel(*b)]),
        [c, m, y, k] => Some([
            channel((1.0 - c) * (1.0 - k)),
            channel((1.0 - m) * (1.0 - k)),
            channel((1.0 - y) * (1.0 - k)),
        ]),
        _ => None,
    }
}

/// Color operands of `sc`/`scn` may end with a pattern name; keep the numbers.
fn color_operands(op: &Operation) -> Vec<f32> {
    op.operands.iter().filter_map(number).collect()
}

/// Byte length of the strings a text operator shows, plus spaces among them.
fn shown_bytes(operand: &Object) -> (usize, usize) {
    match operand {
        Object::String(bytes, _) => (bytes.len(), bytes.iter().filter(|b| **b == b' ').count()),
        _ => (0, 0),
    }
}

struct Interpreter<'a> {
    xobjects: &'a XObjects<'a>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    path: Vec<Segment>,
    path_start: Option<usize>,
    current: (f32, f32),
    clip_pending: bool,
    marks: Vec<Mark>,
}

impl<'a> Interpreter<'a> {
    fn new(xobjects: &'a XObjects<'a>) -> Self {
        Self {
            xobjects,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            path: Vec::new(),
            path_start: None,
            current: (0.0, 0.0),
            clip_pending: false,
            marks: Vec::new(),
        }
    }

    fn begin_path(&mut self, index: usize) {
        if self.path_start.is_none() {
            self.path_start = Some(index);
        }
    }

    fn user(&self, x: f32, y: f32) -> (f32, f32) {
        self.state.ctm.apply(x, y)
    }

    fn move_to(&mut self, index: usize, x: f32, y: f32) {
        self.begin_path(index);
        self.current = (x, y);
        let (ux, uy) = self.user(x, y);
        self.path.push(Segment::MoveTo(ux, uy));
    }

    fn line_to(&mut self, index: usize, x: f32, y: f32) {
        self.begin_path(index);
        self.current = (x, y);
        let (ux, uy) = self.user(x, y);
        self.path.push(Segment::LineTo(ux, uy));
    }

    fn cubic_to(&mut self, index: usize, points: [f32; 6]) {
        self.begin_path(index);
        let [x1, y1, x2, y2, x3, y3] = points;
        self.current = (x3, y3);
        let (a, b) = self.user(x1, y1);
        let (c, d) = self.user(x2, y2);
        let (e, f) = self.user(x3, y3);
        self.path.push(Segment::CubicTo(a, b, c, d, e, f));
    }

    fn finish_path(&mut self, index: usize, kind: MarkKind, close: bool, even_odd: bool) {
        if close {
            self.path.push(Segment::Close);
        }
        let start = self.path_start.take().unwrap_or(index);
        let outline = std::mem::take(&mut self.path);
        let clip = std::mem::replace(&mut self.clip_pending, false);

        // A bare `n` without `W` just discards the path.
        if kind == MarkKind::Clip && !clip {
            return;
        }

        let points = outline.iter().flat_map(|segment| match *segment {
            Segment::MoveTo(x, y) | Segment::LineTo(x, y) => vec![(x, y)],
            Segment::CubicTo(a, b, c, d, e, f) => vec![(a, b), (c, d), (e, f)],
            Segment::Close => Vec::new(),
        });
        let Some(mut bbox) = UserBox::around(points) else {
            return;
        };
        let line_width = self.state.line_width * self.state.ctm.scale();
        if matches!(kind, MarkKind::Stroke | MarkKind::FillStroke) {
            bbox = bbox.expand(line_width / 2.0);
        }

        self.marks.push(Mark {
            ops: start..index + 1,
            kind,
            outline,
            bbox,
            fill: self.state.fill,
            stroke: self.state.stroke,
            line_width,
            even_odd,
            shift: None,
        });
    }

    fn quad_mark(&mut self, index: usize, kind: MarkKind, local: &Matrix, local_box: UserBox) {
        let corners = [
            (local_box.x0, local_box.y0),
            (local_box.x1, local_box.y0),
            (local_box.x1, local_box.y1),
            (local_box.x0, local_box.y1),
        ]
        .map(|(x, y)| local.apply(x, y));
        let Some(bbox) = UserBox::around(corners) else {
            return;
        };
        let mut outline = vec![Segment::MoveTo(corners[0].0, corners[0].1)];
        outline.extend(corners[1..].iter().map(|(x, y)| Segment::LineTo(*x, *y)));
        outline.push(Segment::Close);

        self.marks.push(Mark {
            ops: index..index + 1,
            kind,
            outline,
            bbox,
            fill: self.state.fill,
            stroke: self.state.stroke,
            line_width: 0.0,
            even_odd: false,
            shift: None,
        });
    }

    fn show_text(&mut self, index: usize, glyphs: usize, spaces: usize, adjustment: f32) {
        let size = self.state.font_size;
        let advance = glyphs as f32 * (GLYPH_ADVANCE * size + self.state.char_spacing)
            + spaces as f32 * self.state.word_spacing
            - adjustment / 1000.0 * size;
        let render = self.text_matrix.then(&self.state.ctm);

        if glyphs > 0 && advance.abs() > f32::EPSILON {
            let band = UserBox {
                x0: advance.min(0.0),
                y0: DESCENT * size,
                x1: advance.max(0.0),
                y1: ASCENT * size,
            };
            self.quad_mark(index, MarkKind::Text, &render, band);
            if let Some(mark) = self.marks.last_mut() {
                mark.shift = (size.abs() > f32::EPSILON).then(|| -advance * 1000.0 / size);
                // Paint only the x-height band but hit-test the full glyph box.
                let ink = UserBox { y0: 0.0, y1: INK_TOP * size, ..band };
                let corners = [(ink.x0, ink.y0), (ink.x1, ink.y0), (ink.x1, ink.y1), (ink.x0, ink.y1)]
                    .map(|(x, y)| render.apply(x, y));
                mark.outline = vec![
                    Segment::MoveTo(corners[0].0, corners[0].1),
                    Segment::LineTo(corners[1].0, corners[1].1),
                    Segment::LineTo(corners[2].0, corners[2].1),
                    Segment::LineTo(corners[3].0, corners[3].1),
                    Segment::Close,
                ];
            }
        }

        self.text_matrix = Matrix::translate(advance, 0.0).then(&self.text_matrix);
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn step(&mut self, index: usize, op: &Operation) {
        match op.operator.as_str() {
            "q" => self.stack.push(self.state),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(values) = operands::<6>(op) {
                    self.state.ctm = Matrix::new(values).then(&self.state.ctm);
                }
            }
            "w" => {
                if let Some([width]) = operands::<1>(op) {
                    self.state.line_width = width;
                }
            }
            "g" | "rg" | "k" | "sc" | "scn" => {
                if let Some(rgb) = to_rgb(&color_operands(op)) {
                    self.state.fill = rgb;
                }
            }
            "G" | "RG" | "K" | "SC" | "SCN" => {
                if let Some(rgb) = to_rgb(&color_operands(op)) {
                    self.state.stroke = rgb;
                }
            }
            "cs" => self.state.fill = [0, 0, 0],
            "CS" => self.state.stroke = [0, 0, 0],

            "m" => {
                if let Some([x, y]) = operands::<2>(op) {
                    self.move_to(index, x, y);
                }
            }
            "l" => {
                if let Some([x, y]) = operands::<2>(op) {
                    self.line_to(index, x, y);
                }
            }
            "c" => {
                if let Some(points) = operands::<6>(op) {
                    self.cubic_to(index, points);
                }
            }
            "v" => {
                if let Some([x2, y2, x3, y3]) = operands::<4>(op) {
                    let (x1, y1) = self.current;
                    self.cubic_to(index, [x1, y1, x2, y2, x3, y3]);
                }
            }
            "y" => {
                if let Some([x1, y1, x3, y3]) = operands::<4>(op) {
                    self.cubic_to(index, [x1, y1, x3, y3, x3, y3]);
                }
            }
            "h" => {
                self.begin_path(index);
                self.path.push(Segment::Close);
            }
            "re" => {
                if let Some([x, y, w, h]) = operands::<4>(op) {
                    self.move_to(index, x, y);
                    self.line_to(index, x + w, y);
                    self.line_to(index, x + w, y + h);
                    self.line_to(index, x, y + h);
                    self.path.push(Segment::Close);
                    self.current = (x, y);
                }
            }
            "W" | "W*" => {
                self.begin_path(index);
                self.clip_pending = true;
            }
            "S" => self.finish_path(index, MarkKind::Stroke, false, false),
            "s" => self.finish_path(index, MarkKind::Stroke, true, false),
            "f" | "F" => self.finish_path(index, MarkKind::Fill, false, false),
            "f*" => self.finish_path(index, MarkKind::Fill, false, true),
            "B" => self.finish_path(index, MarkKind::FillStroke, false, false),
            "B*" => self.finish_path(index, MarkKind::FillStroke, false, true),
            "b" => self.finish_path(index, MarkKind::FillStroke, true, false),
            "b*" => self.finish_path(index, MarkKind::FillStroke, true, true),
            "n" => self.finish_path(index, MarkKind::Clip, false, false),

            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.state.font_size = size;
                }
            }
            "Tc" => {
                if let Some([spacing]) = operands::<1>(op) {
                    self.state.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = operands::<1>(op) {
                    self.state.word_spacing = spacing;
                }
            }
            "TL" => {
                if let Some([leading]) = operands::<1>(op) {
                    self.state.leading = leading;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = operands::<2>(op) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = operands::<2>(op) {
                    self.state.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(values) = operands::<6>(op) {
                    self.line_matrix = Matrix::new(values);
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.state.leading),
            "Tj" => {
                let (glyphs, spaces) = op.operands.first().map(shown_bytes).unwrap_or((0, 0));
                self.show_text(index, glyphs, spaces, 0.0);
            }
            "'" => {
                self.next_line(0.0, -self.state.leading);
                let (glyphs, spaces) = op.operands.first().map(shown_bytes).unwrap_or((0, 0));
                self.show_text(index, glyphs, spaces, 0.0);
            }
            "\"" => {
                if let Some(word) = op.operands.first().and_then(number) {
                    self.state.word_spacing = word;
                }
                if let Some(chars) = op.operands.get(1).and_then(number) {
                    self.state.char_spacing = chars;
                }
                self.next_line(0.0, -self.state.leading);
                let (glyphs, spaces) = op.operands.get(2).map(shown_bytes).unwrap_or((0, 0));
                self.show_text(index, glyphs, spaces, 0.0);
            }
            "TJ" => {
                let mut glyphs = 0;
                let mut spaces = 0;
                let mut adjustment = 0.0;
                if let Some(Ok(items)) = op.operands.first().map(Object::as_array) {
                    for item in items {
                        match item {
                            Object::String(..) => {
                                let (g, s) = shown_bytes(item);
                                glyphs += g;
                                spaces += s;
                            }
                            other => adjustment += number(other).unwrap_or(0.0),
                        }
                    }
                }
                self.show_text(index, glyphs, spaces, adjustment);
            }

            "Do" => {
                let name = match op.operands.first() {
                    Some(Object::Name(name)) => name.as_slice(),
                    _ => return,
                };
                let (kind, form) = self.xobjects.lookup(name);
                let ctm = self.state.ctm;
                match form {
                    Some((matrix, bbox)) => self.quad_mark(index, kind, &matrix.then(&ctm), bbox),
                    None => {
                        let unit = UserBox { x0: 0.0, y0: 0.0, x1: 1.0, y1: 1.0 };
                        self.quad_mark(index, kind, &ctm, unit);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Interprets `ops` and returns the marks in painting order.
pub(crate) fn interpret(ops: &[Operation], xobjects: &XObjects<'_>) -> Vec<Mark> {
    let mut interpreter = Interpreter::new(xobjects);
    for (index, op) in ops.iter().enumerate() {
        interpreter.step(index, op);
    }
    interpreter.marks
}

/// Indices of operations that must be dropped to remove every mark
/// touching one of `areas`.
pub(crate) fn redacted_ops(marks: &[Mark], areas: &[UserBox]) -> (Vec<bool>, usize) {
    let len = marks.iter().map(|mark| mark.ops.end).max().unwrap_or(0);
    let mut dropped = vec![false; len];
    let mut removed = 0;

    for mark in marks.iter().filter(|mark| mark.is_removable()) {
        if areas.iter().any(|area| area.intersects(&mark.bbox)) {
            for index in mark.ops.clone() {
                dropped[index] = true;
            }
            removed += 1;
        }
    }

    (dropped, removed)
}

/// Drops the operations flagged in `dropped`.
///
/// A dropped text-showing operation leaves a bare `TJ` displacement behind,
/// together with the line move and spacing it carried, so runs that follow
/// on the same line keep their position.
pub(crate) fn strip_ops(ops: Vec<Operation>, marks: &[Mark], dropped: &[bool]) -> Vec<Operation> {
    let shifts: HashMap<usize, f32> = marks
        .iter()
        .filter(|mark| mark.kind == MarkKind::Text)
        .filter_map(|mark| mark.shift.map(|shift| (mark.ops.start, shift)))
        .collect();

    let mut kept = Vec::with_capacity(ops.len());
    for (index, op) in ops.into_iter().enumerate() {
        if !dropped.get(index).copied().unwrap_or(false) {
            kept.push(op);
            continue;
        }
        match op.operator.as_str() {
            "'" => kept.push(Operation::new("T*", vec![])),
            "\"" => {
                let mut operands = op.operands.into_iter();
                if let Some(word) = operands.next() {
                    kept.push(Operation::new("Tw", vec![word]));
                }
                if let Some(chars) = operands.next() {
                    kept.push(Operation::new("Tc", vec![chars]));
                }
                kept.push(Operation::new("T*", vec![]));
            }
            "Tj" | "TJ" => {}
            _ => continue,
        }
        if let Some(shift) = shifts.get(&index) {
            kept.push(Operation::new("TJ", vec![Object::Array(vec![Object::Real(*shift)])]));
        }
    }
    kept
}
