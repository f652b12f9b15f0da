use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Data trait used throughout the package
/// to control for floating point numbers.
pub trait FloatData<T>:
    Mul<Output = T>
    + Display
    + Add<Output = T>
    + Div<Output = T>
    + Neg<Output = T>
    + Copy
    + Debug
    + PartialEq
    + PartialOrd
    + AddAssign
    + Sub<Output = T>
    + SubAssign
    + Sum
    + std::marker::Send
    + std::marker::Sync
{
    /// Zero value.
    const ZERO: T;
    /// One value.
    const ONE: T;
    /// Minimum value.
    const MIN: T;
    /// Maximum value.
    const MAX: T;
    /// Not a Number value.
    const NAN: T;
    /// Infinity value.
    const INFINITY: T;
    /// Convert from usize.
    fn from_usize(v: usize) -> T;
    /// Check if value is NaN.
    fn is_nan(self) -> bool;
    /// Natural logarithm.
    fn ln(self) -> T;
    /// Exponential function.
    fn exp(self) -> T;
}
impl FloatData<f64> for f64 {
    const ZERO: f64 = 0.0;
    const ONE: f64 = 1.0;
    const MIN: f64 = f64::MIN;
    const MAX: f64 = f64::MAX;
    const NAN: f64 = f64::NAN;
    const INFINITY: f64 = f64::INFINITY;

    fn from_usize(v: usize) -> f64 {
        v as f64
    }
    fn is_nan(self) -> bool {
        self.is_nan()
    }
    fn ln(self) -> f64 {
        self.ln()
    }
    fn exp(self) -> f64 {
        self.exp()
    }
}

impl FloatData<f32> for f32 {
    const ZERO: f32 = 0.0;
    const ONE: f32 = 1.0;
    const MIN: f32 = f32::MIN;
    const MAX: f32 = f32::MAX;
    const NAN: f32 = f32::NAN;
    const INFINITY: f32 = f32::INFINITY;

    fn from_usize(v: usize) -> f32 {
        v as f32
    }
    fn is_nan(self) -> bool {
        self.is_nan()
    }
    fn ln(self) -> f32 {
        self.ln()
    }
    fn exp(self) -> f32 {
        self.exp()
    }
}

/// Contiguous row major logit container.
///
/// Holds the concatenated validation logits in a single memory block, one row
/// per example and one column per class. Row major order keeps each example's
/// class scores contiguous, so a class-index range maps to a plain sub-slice
/// of the row.
#[derive(Debug, Clone, PartialEq)]
pub struct LogitBatch {
    /// The raw data stored in a single vector, row by row.
    pub data: Vec<f64>,
    /// Number of rows (examples).
    pub rows: usize,
    /// Number of columns (classes).
    pub cols: usize,
}

impl LogitBatch {
    /// Create an empty batch with the given class width.
    pub fn new(cols: usize) -> Self {
        LogitBatch {
            data: Vec::new(),
            rows: 0,
            cols,
        }
    }

    /// Create an empty batch with room reserved for `rows` examples.
    pub fn with_capacity(rows: usize, cols: usize) -> Self {
        LogitBatch {
            data: Vec::with_capacity(rows * cols),
            rows: 0,
            cols,
        }
    }

    /// Build a batch from a flat row major vector.
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        LogitBatch { data, rows, cols }
    }

    /// Append one example's logit row. The row width must equal `cols`.
    pub fn push_row(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.cols);
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    /// Get the logit row of the `i`th example.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Get a mutable view of the `i`th example's row.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Slice the class-index range `[start, end)` of the `i`th example.
    pub fn range(&self, i: usize, start: usize, end: usize) -> &[f64] {
        &self.data[i * self.cols + start..i * self.cols + end]
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}
