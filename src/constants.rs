pub const LEARNING_RATE: f64 = 0.01;
pub const MAX_ITERATIONS: usize = 50;
pub const LBFGS_HISTORY: usize = 10;
pub const GRADIENT_TOLERANCE: f64 = 1e-7;
pub const CHANGE_TOLERANCE: f64 = 1e-9;
pub const MAX_LINE_SEARCH_STEPS: usize = 20;
