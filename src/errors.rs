//! Errors
//!
//! Custom error types used throughout the `recal` crate.
use thiserror::Error;

/// Errors that can occur while building or fitting a calibration model.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// Batches produced by the loader disagree on shape.
    #[error("Dimension mismatch in batch {0}: expected {1}, found {2}.")]
    DimensionMismatch(usize, usize, usize),
    /// The loader produced no examples to fit on.
    #[error("The validation loader produced no examples, nothing to calibrate on.")]
    EmptyValidationSet,
    /// Unable to serialize or deserialize a calibration wrapper.
    #[error("Unable to serialize or deserialize the calibration wrapper: {0}")]
    Serialization(String),
}
