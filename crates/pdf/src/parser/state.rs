//! Graphics state and the save/restore stack driven by `q` / `Q`.

use super::backend::{get_number_from_value, PdfValue};

/// A 2×3 affine matrix `[a b c d e f]` in PDF's row-vector convention:
/// a point transforms as `[x y 1] × M`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Read six numeric operands. Returns `None` if any is missing or not a
    /// number.
    pub fn from_operands(operands: &[PdfValue]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let mut v = [0.0; 6];
        for (slot, operand) in v.iter_mut().zip(operands) {
            *slot = get_number_from_value(operand)?;
        }
        Some(Self::new(v[0], v[1], v[2], v[3], v[4], v[5]))
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Length of the transformed unit y vector.
    pub fn vertical_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

/// Everything the dispatcher tracks between operators.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub ctm: Matrix,
    pub text_matrix: Matrix,
    pub line_matrix: Matrix,
    pub font_size: f64,
    pub font_key: Vec<u8>,
    /// Set by `TL` or `TD`; `T*` falls back to `font_size * 1.2` otherwise.
    pub leading: Option<f64>,
    /// `Tz` as a factor (1.0 is 100%).
    pub horizontal_scaling: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 0.0,
            font_key: Vec::new(),
            leading: None,
            horizontal_scaling: 1.0,
        }
    }
}

/// A stack of value-copied snapshots. `current` is the live state; `saved`
/// holds what `q` pushed.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStack {
    pub current: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl GraphicsStack {
    pub fn save(&mut self) {
        self.saved.push(self.current.clone());
    }

    /// Pop the last saved state. An unbalanced `Q` is ignored.
    pub fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.current = state;
        }
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Pop until at most `depth` states remain saved.
    pub fn restore_to(&mut self, depth: usize) {
        while self.saved.len() > depth {
            self.restore();
        }
    }
}
