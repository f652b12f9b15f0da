// Modules
pub mod calibrate;
pub mod constants;
pub mod data;
pub mod errors;
pub mod extract;
pub mod optimizer;
pub mod scaling;
pub mod utils;
pub mod wrapper;

// Individual classes, and functions
pub use calibrate::{calibrate, fit};
pub use data::LogitBatch;
pub use extract::{extract_logits, Scorer};
pub use optimizer::{FitSummary, Lbfgs};
pub use scaling::{Calibration, Scaling};
pub use wrapper::CalibrationWrapper;
