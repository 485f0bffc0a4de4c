//! Content-stream interpreter: walks a page's drawing program and emits one
//! [`PositionedTextRun`] per text-showing operator, recursing into form
//! XObjects.
//!
//! | Operator | Effect |
//! |----------|--------|
//! | `q` `Q`  | Save / restore the graphics state |
//! | `cm`     | Prepend a matrix to the CTM |
//! | `BT` `ET`| Reset text and line matrices / no-op |
//! | `Tf`     | Select font key and size |
//! | `Tm`     | Set text and line matrix |
//! | `Td` `TD`| Move to the next line (TD also sets leading) |
//! | `TL` `T*`| Set leading / move down one line |
//! | `Tz`     | Set horizontal scaling |
//! | `Tj` `'` `"` | Show a string |
//! | `TJ`     | Show strings, ignoring kerning adjustments |
//! | `Do`     | Run a form XObject |
//!
//! Anything else is ignored. Operators with unusable operands are skipped.

use serde::{Deserialize, Serialize};

use super::backend::{get_number_from_value, ContentOp, ObjectId, PageId, PdfBackend, PdfValue, ResourceScope};
use super::state::{GraphicsStack, GraphicsState, Matrix};
use crate::coords::{pt_to_px, to_viewer};
use crate::types::{PageFrame, PositionedTextRun};
use crate::PdfError;

/// Approximate glyph advance as a fraction of the font size.
pub const GLYPH_WIDTH_RATIO: f64 = 0.6;

/// Line advance used by `T*` when no leading was set.
pub const DEFAULT_LEADING_RATIO: f64 = 1.2;

/// Knobs for content-stream extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Maximum nesting of form XObjects followed through `Do`.
    pub max_form_depth: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { max_form_depth: 32 }
    }
}

pub struct Interpreter<'a> {
    backend: &'a dyn PdfBackend,
    frame: &'a PageFrame,
    options: &'a ExtractOptions,
    stack: GraphicsStack,
    /// Forms currently being executed, outermost first.
    call_chain: Vec<ObjectId>,
    /// `Q` never pops below this depth; it protects the state saved around
    /// the form currently running.
    floor: usize,
    runs: Vec<PositionedTextRun>,
}

impl<'a> Interpreter<'a> {
    pub fn new(backend: &'a dyn PdfBackend, frame: &'a PageFrame, options: &'a ExtractOptions) -> Self {
        Self {
            backend,
            frame,
            options,
            stack: GraphicsStack::default(),
            call_chain: Vec::new(),
            floor: 0,
            runs: Vec::new(),
        }
    }

    pub fn state(&self) -> &GraphicsState {
        &self.stack.current
    }

    /// Interpret `ops` with names resolved against `scope`.
    pub fn run(&mut self, ops: &[ContentOp], scope: ResourceScope) {
        for op in ops {
            if !self.dispatch(op, scope) {
                log::debug!("skipping `{}` with unusable operands {:?}", op.operator, op.operands);
            }
        }
    }

    pub fn finish(self) -> Vec<PositionedTextRun> {
        self.runs
    }

    /// Apply one operator. Returns `false` when its operands could not be
    /// used and the operator was skipped.
    fn dispatch(&mut self, op: &ContentOp, scope: ResourceScope) -> bool {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            // -- Graphics state ------------------------------------------
            "q" => self.stack.save(),
            "Q" => {
                if self.stack.depth() > self.floor {
                    self.stack.restore();
                }
            }
            "cm" => {
                let Some(m) = Matrix::from_operands(operands) else {
                    return false;
                };
                let state = &mut self.stack.current;
                state.ctm = m.multiply(&state.ctm);
            }

            // -- Text objects --------------------------------------------
            "BT" => {
                let state = &mut self.stack.current;
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "ET" => {}
            "Tf" => {
                let (Some(PdfValue::Name(key)), Some(size)) =
                    (operands.first(), operands.get(1).and_then(get_number_from_value))
                else {
                    return false;
                };
                let state = &mut self.stack.current;
                state.font_key = key.clone();
                state.font_size = size;
            }

            // -- Positioning ---------------------------------------------
            "Tm" => {
                let Some(m) = Matrix::from_operands(operands) else {
                    return false;
                };
                let state = &mut self.stack.current;
                state.text_matrix = m;
                state.line_matrix = m;
            }
            "Td" => {
                let Some((tx, ty)) = two_numbers(operands) else {
                    return false;
                };
                self.next_line(tx, ty);
            }
            "TD" => {
                let Some((tx, ty)) = two_numbers(operands) else {
                    return false;
                };
                self.stack.current.leading = Some(-ty);
                self.next_line(tx, ty);
            }
            "TL" => {
                let Some(leading) = operands.first().and_then(get_number_from_value) else {
                    return false;
                };
                self.stack.current.leading = Some(leading);
            }
            "T*" => self.next_line(0.0, -self.leading()),
            "Tz" => {
                let Some(percent) = operands.first().and_then(get_number_from_value) else {
                    return false;
                };
                self.stack.current.horizontal_scaling = percent / 100.0;
            }

            // -- Showing text --------------------------------------------
            "Tj" => {
                let Some(PdfValue::Str(bytes)) = operands.first() else {
                    return false;
                };
                self.show(bytes, scope);
            }
            "'" => {
                let Some(PdfValue::Str(bytes)) = operands.first() else {
                    return false;
                };
                self.next_line(0.0, -self.leading());
                self.show(bytes, scope);
            }
            "\"" => {
                let Some(PdfValue::Str(bytes)) = operands.get(2) else {
                    return false;
                };
                self.next_line(0.0, -self.leading());
                self.show(bytes, scope);
            }
            "TJ" => {
                let Some(PdfValue::Array(items)) = operands.first() else {
                    return false;
                };
                let state = &self.stack.current;
                let text: String = items
                    .iter()
                    .filter_map(|item| match item {
                        PdfValue::Str(bytes) => Some(self.backend.decode_text(scope, &state.font_key, bytes)),
                        _ => None,
                    })
                    .collect();
                self.emit(text);
            }

            // -- Sub-programs --------------------------------------------
            "Do" => {
                let Some(PdfValue::Name(name)) = operands.first() else {
                    return false;
                };
                self.invoke_form(name, scope);
            }

            _ => {}
        }
        true
    }

    fn leading(&self) -> f64 {
        let state = &self.stack.current;
        state.leading.unwrap_or(state.font_size * DEFAULT_LEADING_RATIO)
    }

    /// Prepend a translation to the line matrix and start the text matrix
    /// there.
    fn next_line(&mut self, tx: f64, ty: f64) {
        let state = &mut self.stack.current;
        state.line_matrix = Matrix::translate(tx, ty).multiply(&state.line_matrix);
        state.text_matrix = state.line_matrix;
    }

    fn show(&mut self, bytes: &[u8], scope: ResourceScope) {
        let text = self
            .backend
            .decode_text(scope, &self.stack.current.font_key, bytes);
        self.emit(text);
    }

    /// Emit a run anchored at the current text position and advance the pen
    /// by the approximated width.
    fn emit(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let chars = text.chars().count() as f64;
        let state = &mut self.stack.current;
        let effective = state.text_matrix.multiply(&state.ctm);

        let scale = effective.vertical_scale();
        let scaled_font = if scale > 0.0 {
            state.font_size * scale
        } else {
            state.font_size
        };

        let frame = self.frame;
        let (x, top) = to_viewer(
            effective.e,
            effective.f,
            frame.crop_height,
            frame.crop_offset_x,
            frame.crop_offset_y,
        );

        self.runs.push(PositionedTextRun {
            text,
            x,
            y: top - pt_to_px(scaled_font),
            width: pt_to_px(chars * scaled_font * GLYPH_WIDTH_RATIO * state.horizontal_scaling),
            height: pt_to_px(scaled_font),
        });

        let advance = chars * state.font_size * GLYPH_WIDTH_RATIO * state.horizontal_scaling;
        state.text_matrix = Matrix::translate(advance, 0.0).multiply(&state.text_matrix);
    }

    fn invoke_form(&mut self, name: &[u8], scope: ResourceScope) {
        if self.call_chain.len() >= self.options.max_form_depth {
            log::warn!(
                "form nesting exceeds {} levels, skipping /{}",
                self.options.max_form_depth,
                String::from_utf8_lossy(name)
            );
            return;
        }
        let Some(form) = self.backend.resolve_sub_program(scope, name) else {
            log::debug!("`Do` target /{} is not a form, skipping", String::from_utf8_lossy(name));
            return;
        };
        if self.call_chain.contains(&form.id) {
            log::warn!(
                "form {:?} (/{}) invokes itself, skipping",
                form.id,
                String::from_utf8_lossy(name)
            );
            return;
        }

        let ops = self.backend.decode_content(&form.content);

        self.stack.save();
        let depth = self.stack.depth();
        let outer_floor = std::mem::replace(&mut self.floor, depth);
        if let Some(m) = form.matrix {
            let state = &mut self.stack.current;
            state.ctm = m.multiply(&state.ctm);
        }

        self.call_chain.push(form.id);
        self.run(&ops, form.scope);
        self.call_chain.pop();

        self.stack.restore_to(depth);
        self.floor = outer_floor;
        self.stack.restore();
    }
}

fn two_numbers(operands: &[PdfValue]) -> Option<(f64, f64)> {
    let a = operands.first().and_then(get_number_from_value)?;
    let b = operands.get(1).and_then(get_number_from_value)?;
    Some((a, b))
}

/// Interpret one page and return its text runs in draw order.
///
/// Fails only when the page geometry cannot be resolved; unreadable content
/// yields an empty result.
pub fn extract_page_runs(
    backend: &dyn PdfBackend,
    page_id: PageId,
    options: &ExtractOptions,
) -> Result<Vec<PositionedTextRun>, PdfError> {
    let frame = backend.page_frame(page_id)?;
    let content = match backend.page_content(page_id) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("page {:?} has no readable content: {}", page_id, e);
            return Ok(Vec::new());
        }
    };
    let ops = backend.decode_content(&content);

    let mut interpreter = Interpreter::new(backend, &frame, options);
    interpreter.run(&ops, frame.scope);
    Ok(interpreter.finish())
}

/// Number of text-showing operators (`Tj`, `TJ`, `'`, `"`) in `ops`.
pub fn count_text_operators(ops: &[ContentOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op.operator.as_str(), "Tj" | "TJ" | "'" | "\""))
        .count()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::super::backend::{decode_text_simple, SubProgram};
    use super::*;

    const PAGE: PageId = (1, 0);
    const EPS: f64 = 1e-6;

    // -- Helpers for building test data -----------------------------------

    struct MockBackend {
        frame: PageFrame,
        content: Vec<u8>,
        forms: HashMap<Vec<u8>, SubProgram>,
    }

    impl MockBackend {
        fn new(content: &str) -> Self {
            Self {
                frame: frame(),
                content: content.as_bytes().to_vec(),
                forms: HashMap::new(),
            }
        }

        fn with_form(mut self, name: &str, id: u32, content: &str, matrix: Option<Matrix>) -> Self {
            self.forms.insert(
                name.as_bytes().to_vec(),
                SubProgram {
                    id: (id, 0),
                    content: content.as_bytes().to_vec(),
                    matrix,
                    scope: ResourceScope::Form((id, 0)),
                },
            );
            self
        }
    }

    impl PdfBackend for MockBackend {
        fn pages(&self) -> BTreeMap<u32, PageId> {
            BTreeMap::from([(1, PAGE)])
        }

        fn page_frame(&self, page: PageId) -> Result<PageFrame, PdfError> {
            if page == PAGE {
                Ok(self.frame.clone())
            } else {
                Err(PdfError::Parse(format!("no page {:?}", page)))
            }
        }

        fn page_content(&self, _page: PageId) -> Result<Vec<u8>, PdfError> {
            Ok(self.content.clone())
        }

        fn resolve_sub_program(&self, _scope: ResourceScope, name: &[u8]) -> Option<SubProgram> {
            self.forms.get(name).cloned()
        }

        fn decode_text(&self, _scope: ResourceScope, _font_key: &[u8], bytes: &[u8]) -> String {
            decode_text_simple(bytes)
        }
    }

    fn frame() -> PageFrame {
        PageFrame {
            page: PAGE,
            crop_offset_x: 0.0,
            crop_offset_y: 0.0,
            crop_height: 800.0,
            scope: ResourceScope::Page(PAGE),
        }
    }

    fn make_op(operator: &str, operands: Vec<PdfValue>) -> ContentOp {
        ContentOp {
            operator: operator.to_string(),
            operands,
        }
    }

    fn num(v: f64) -> PdfValue {
        PdfValue::Real(v)
    }

    fn s(text: &str) -> PdfValue {
        PdfValue::Str(text.as_bytes().to_vec())
    }

    fn bt_op() -> ContentOp {
        make_op("BT", vec![])
    }

    fn tf_op(size: f64) -> ContentOp {
        make_op("Tf", vec![PdfValue::Name(b"F1".to_vec()), num(size)])
    }

    fn tm_op(e: f64, f: f64) -> ContentOp {
        make_op("Tm", vec![num(1.0), num(0.0), num(0.0), num(1.0), num(e), num(f)])
    }

    fn tj_op(text: &str) -> ContentOp {
        make_op("Tj", vec![s(text)])
    }

    fn run_ops(ops: &[ContentOp]) -> Vec<PositionedTextRun> {
        let backend = MockBackend::new("");
        let frame = frame();
        let options = ExtractOptions::default();
        let mut interpreter = Interpreter::new(&backend, &frame, &options);
        interpreter.run(ops, frame.scope);
        interpreter.finish()
    }

    fn extract(backend: &MockBackend) -> Vec<PositionedTextRun> {
        extract_page_runs(backend, PAGE, &ExtractOptions::default()).unwrap()
    }

    fn texts(runs: &[PositionedTextRun]) -> Vec<&str> {
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    // =====================================================================
    // Text run emitter
    // =====================================================================

    #[test]
    fn test_tj_emits_viewer_space_box() {
        let runs = run_ops(&[bt_op(), tf_op(10.0), tm_op(100.0, 700.0), tj_op("Hello")]);
        assert_eq!(runs.len(), 1);
        let r = &runs[0];
        assert_eq!(r.text, "Hello");
        assert!((r.x - 100.0 * 4.0 / 3.0).abs() < EPS);
        // (800 - 700 - 10) pt -> px
        assert!((r.y - 120.0).abs() < EPS);
        assert!((r.width - 5.0 * 10.0 * 0.6 * 4.0 / 3.0).abs() < EPS);
        assert!((r.height - 10.0 * 4.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_tj_array_concatenates_and_drops_kerning() {
        let tj = make_op(
            "TJ",
            vec![PdfValue::Array(vec![s("Hel"), PdfValue::Integer(-50), s("lo")])],
        );
        let runs = run_ops(&[bt_op(), tf_op(12.0), tj]);
        assert_eq!(texts(&runs), vec!["Hello"]);
    }

    #[test]
    fn test_empty_string_emits_nothing() {
        let runs = run_ops(&[bt_op(), tf_op(12.0), tj_op("")]);
        assert!(runs.is_empty());
    }

    #[test]
    fn test_consecutive_shows_advance_the_pen() {
        let runs = run_ops(&[bt_op(), tf_op(10.0), tm_op(0.0, 500.0), tj_op("ab"), tj_op("cd")]);
        assert_eq!(runs.len(), 2);
        assert!((runs[1].x - runs[0].width).abs() < EPS);
        assert_eq!(runs[0].y, runs[1].y);
    }

    #[test]
    fn test_horizontal_scaling_stretches_width_only() {
        let tz = make_op("Tz", vec![num(50.0)]);
        let runs = run_ops(&[bt_op(), tf_op(10.0), tz, tm_op(0.0, 500.0), tj_op("ab"), tj_op("cd")]);
        assert!((runs[0].width - 2.0 * 10.0 * 0.6 * 0.5 * 4.0 / 3.0).abs() < EPS);
        assert!((runs[0].height - 10.0 * 4.0 / 3.0).abs() < EPS);
        assert!((runs[1].x - runs[0].width).abs() < EPS);
    }

    #[test]
    fn test_text_matrix_scale_drives_font_size() {
        let tm = make_op("Tm", vec![num(2.0), num(0.0), num(0.0), num(2.0), num(0.0), num(0.0)]);
        let runs = run_ops(&[bt_op(), tf_op(1.0), tm, tj_op("x")]);
        assert!((runs[0].height - 2.0 * 4.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_degenerate_scale_falls_back_to_font_size() {
        let cm = make_op("cm", vec![num(1.0), num(0.0), num(0.0), num(0.0), num(0.0), num(0.0)]);
        let runs = run_ops(&[cm, bt_op(), tf_op(9.0), tj_op("x")]);
        assert!((runs[0].height - 12.0).abs() < EPS);
    }

    #[test]
    fn test_crop_offset_shifts_runs() {
        let backend = MockBackend::new("");
        let mut frame = frame();
        frame.crop_offset_x = 30.0;
        frame.crop_offset_y = 50.0;
        frame.crop_height = 700.0;
        let options = ExtractOptions::default();
        let mut interpreter = Interpreter::new(&backend, &frame, &options);
        interpreter.run(&[bt_op(), tf_op(10.0), tm_op(30.0, 740.0), tj_op("x")], frame.scope);
        let runs = interpreter.finish();
        assert!(runs[0].x.abs() < EPS);
        // Baseline 10pt below the visible top, minus the 10pt font height.
        assert!(runs[0].y.abs() < EPS);
    }

    // =====================================================================
    // Operator dispatcher
    // =====================================================================

    #[test]
    fn test_cm_prepends_to_ctm() {
        let backend = MockBackend::new("");
        let frame = frame();
        let options = ExtractOptions::default();
        let mut interpreter = Interpreter::new(&backend, &frame, &options);
        interpreter.run(
            &[
                make_op("cm", vec![num(2.0), num(0.0), num(0.0), num(2.0), num(0.0), num(0.0)]),
                make_op("cm", vec![num(1.0), num(0.0), num(0.0), num(1.0), num(10.0), num(20.0)]),
            ],
            frame.scope,
        );
        // The later translation is expressed in the scaled space.
        assert_eq!(interpreter.state().ctm, Matrix::new(2.0, 0.0, 0.0, 2.0, 20.0, 40.0));
    }

    #[test]
    fn test_line_operators_and_leading() {
        let backend = MockBackend::new("");
        let frame = frame();
        let options = ExtractOptions::default();
        let mut interpreter = Interpreter::new(&backend, &frame, &options);
        fn f(i: &Interpreter<'_>) -> f64 {
            i.state().text_matrix.f
        }

        interpreter.run(
            &[bt_op(), tf_op(10.0), make_op("Td", vec![num(10.0), num(700.0)])],
            frame.scope,
        );
        assert!((f(&interpreter) - 700.0).abs() < EPS);

        // Default leading is 1.2 × font size.
        interpreter.run(&[make_op("T*", vec![])], frame.scope);
        assert!((f(&interpreter) - 688.0).abs() < EPS);

        interpreter.run(&[make_op("TL", vec![num(15.0)]), make_op("T*", vec![])], frame.scope);
        assert!((f(&interpreter) - 673.0).abs() < EPS);

        // TD sets the leading to -ty.
        interpreter.run(&[make_op("TD", vec![num(0.0), num(-20.0)]), make_op("T*", vec![])], frame.scope);
        assert!((f(&interpreter) - 633.0).abs() < EPS);
        assert!((interpreter.state().text_matrix.e - 10.0).abs() < EPS);
    }

    #[test]
    fn test_quote_operators_move_to_next_line() {
        let dquote = make_op("\"", vec![num(0.0), num(0.0), s("third")]);
        let runs = run_ops(&[
            bt_op(),
            tf_op(10.0),
            tm_op(0.0, 700.0),
            tj_op("first"),
            make_op("'", vec![s("second")]),
            dquote,
        ]);
        assert_eq!(texts(&runs), vec!["first", "second", "third"]);
        // Each line is 12pt (16px) lower and starts at the left margin.
        assert!((runs[1].y - runs[0].y - 16.0).abs() < EPS);
        assert!((runs[2].y - runs[1].y - 16.0).abs() < EPS);
        assert!(runs[1].x.abs() < EPS);
    }

    #[test]
    fn test_restore_on_empty_stack_is_not_fatal() {
        let runs = run_ops(&[make_op("Q", vec![]), make_op("Q", vec![]), bt_op(), tf_op(10.0), tj_op("ok")]);
        assert_eq!(texts(&runs), vec!["ok"]);
    }

    #[test]
    fn test_save_restore_scopes_ctm() {
        let runs = run_ops(&[
            make_op("q", vec![]),
            make_op("cm", vec![num(1.0), num(0.0), num(0.0), num(1.0), num(300.0), num(0.0)]),
            make_op("Q", vec![]),
            bt_op(),
            tf_op(10.0),
            tj_op("x"),
        ]);
        assert!(runs[0].x.abs() < EPS);
    }

    #[test]
    fn test_text_outside_bt_is_tolerated() {
        let runs = run_ops(&[tf_op(10.0), tj_op("loose")]);
        assert_eq!(texts(&runs), vec!["loose"]);
    }

    #[test]
    fn test_malformed_operands_skip_only_that_operator() {
        let runs = run_ops(&[
            bt_op(),
            tf_op(10.0),
            make_op("Tf", vec![PdfValue::Name(b"F2".to_vec())]),
            make_op("Tm", vec![num(1.0), PdfValue::Null]),
            make_op("Tj", vec![num(3.0)]),
            make_op("xyz", vec![num(1.0)]),
            tj_op("kept"),
        ]);
        assert_eq!(texts(&runs), vec!["kept"]);
        assert!((runs[0].height - 10.0 * 4.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_count_text_operators() {
        let ops = vec![bt_op(), tj_op("a"), make_op("TJ", vec![]), make_op("'", vec![]), make_op("ET", vec![])];
        assert_eq!(count_text_operators(&ops), 3);
        assert_eq!(count_text_operators(&[]), 0);
    }

    // =====================================================================
    // Sub-program resolver
    // =====================================================================

    #[test]
    fn test_text_inside_nested_form_is_extracted() {
        let backend = MockBackend::new("/Fm1 Do")
            .with_form("Fm1", 10, "BT /F1 12 Tf 1 0 0 1 50 600 Tm (Inside) Tj ET", None);
        let runs = extract(&backend);
        assert_eq!(texts(&runs), vec!["Inside"]);
        assert!((runs[0].x - 50.0 * 4.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_form_matrix_applies_and_does_not_leak() {
        let backend = MockBackend::new("q /Fm1 Do Q BT /F1 10 Tf (after) Tj ET").with_form(
            "Fm1",
            10,
            // Unbalanced q/Q inside the form must not disturb the caller.
            "q q 1 0 0 1 5 0 cm Q Q Q BT /F1 10 Tf (inside) Tj ET",
            Some(Matrix::translate(100.0, 0.0)),
        );
        let runs = extract(&backend);
        assert_eq!(texts(&runs), vec!["inside", "after"]);
        assert!((runs[0].x - 100.0 * 4.0 / 3.0).abs() < EPS);
        assert!(runs[1].x.abs() < EPS);
    }

    #[test]
    fn test_state_restored_after_form_with_unbalanced_save() {
        let backend = MockBackend::new("/Fm1 Do BT /F1 10 Tf (after) Tj ET")
            .with_form("Fm1", 10, "q 1 0 0 1 250 0 cm", None);
        let runs = extract(&backend);
        assert_eq!(texts(&runs), vec!["after"]);
        assert!(runs[0].x.abs() < EPS);
    }

    #[test]
    fn test_self_referencing_form_is_cut() {
        let backend = MockBackend::new("/Fm1 Do")
            .with_form("Fm1", 10, "/Fm1 Do BT /F1 10 Tf (loop) Tj ET", None);
        let runs = extract(&backend);
        assert_eq!(texts(&runs), vec!["loop"]);
    }

    #[test]
    fn test_form_depth_is_capped() {
        let backend = MockBackend::new("/A Do")
            .with_form("A", 10, "/B Do BT /F1 10 Tf (a) Tj ET", None)
            .with_form("B", 11, "/C Do BT /F1 10 Tf (b) Tj ET", None)
            .with_form("C", 12, "BT /F1 10 Tf (c) Tj ET", None);
        let options = ExtractOptions { max_form_depth: 2 };
        let runs = extract_page_runs(&backend, PAGE, &options).unwrap();
        assert_eq!(texts(&runs), vec!["b", "a"]);
    }

    #[test]
    fn test_unresolved_do_is_skipped() {
        let backend = MockBackend::new("/Missing Do BT /F1 10 Tf (still here) Tj ET");
        assert_eq!(texts(&extract(&backend)), vec!["still here"]);
    }

    // =====================================================================
    // Page-level extraction
    // =====================================================================

    #[test]
    fn test_garbled_stream_keeps_runs_before_corruption() {
        let backend = MockBackend::new("BT /F1 10 Tf (one) Tj (two) Tj (thr");
        assert_eq!(texts(&extract(&backend)), vec!["one", "two"]);
    }

    #[test]
    fn test_unknown_page_is_an_error() {
        let backend = MockBackend::new("");
        assert!(extract_page_runs(&backend, (99, 0), &ExtractOptions::default()).is_err());
    }

    #[test]
    fn test_runs_keep_draw_order() {
        let backend = MockBackend::new("BT /F1 10 Tf 1 0 0 1 0 100 Tm (low) Tj 1 0 0 1 0 700 Tm (high) Tj ET");
        assert_eq!(texts(&extract(&backend)), vec!["low", "high"]);
    }
}
