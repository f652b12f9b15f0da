//! Per-range calibration sub-models
//!
//! Each sub-model holds one or two learnable scalars and corrects a
//! contiguous slice of a logit row. The sub-model kind is chosen by a string
//! tag at build time, so an unknown tag fails before any fitting happens.
use crate::errors::CalibrationError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The kind of correction fitted over each class-index range.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Calibration {
    /// Affine correction `alpha * z + beta`.
    Linear,
    /// Temperature correction `z / t`.
    Temperature,
}

impl FromStr for Calibration {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Calibration::Linear),
            "temperature" => Ok(Calibration::Temperature),
            _ => Err(CalibrationError::ParseString(
                s.to_string(),
                "Calibration".to_string(),
                items_to_strings(vec!["linear", "temperature"]),
            )),
        }
    }
}

/// A calibration sub-model with its learnable scalars.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum Scaling {
    /// `alpha * z + beta` applied elementwise over the range.
    Linear { alpha: f64, beta: f64 },
    /// `z / temperature` applied elementwise over the range.
    Temperature { temperature: f64 },
}

impl Scaling {
    /// Create a sub-model with identity initial parameters.
    pub fn new(calibration: Calibration) -> Self {
        match calibration {
            Calibration::Linear => Scaling::Linear { alpha: 1.0, beta: 0.0 },
            Calibration::Temperature => Scaling::Temperature { temperature: 1.0 },
        }
    }

    /// Number of learnable scalars held by this sub-model.
    pub fn n_params(&self) -> usize {
        match self {
            Scaling::Linear { .. } => 2,
            Scaling::Temperature { .. } => 1,
        }
    }

    /// Append the current scalars to `out`.
    pub fn push_params(&self, out: &mut Vec<f64>) {
        match self {
            Scaling::Linear { alpha, beta } => {
                out.push(*alpha);
                out.push(*beta);
            }
            Scaling::Temperature { temperature } => out.push(*temperature),
        }
    }

    /// Overwrite the scalars from a flat slice of length `n_params`.
    pub fn set_params(&mut self, params: &[f64]) {
        match self {
            Scaling::Linear { alpha, beta } => {
                *alpha = params[0];
                *beta = params[1];
            }
            Scaling::Temperature { temperature } => *temperature = params[0],
        }
    }

    /// Apply the correction to `input`, writing into `out`. Both slices must
    /// have the width of this sub-model's range.
    #[inline]
    pub fn apply_into(&self, input: &[f64], out: &mut [f64]) {
        match self {
            Scaling::Linear { alpha, beta } => {
                for (o, z) in out.iter_mut().zip(input) {
                    *o = alpha * z + beta;
                }
            }
            Scaling::Temperature { temperature } => {
                for (o, z) in out.iter_mut().zip(input) {
                    *o = z / temperature;
                }
            }
        }
    }

    /// Accumulate the loss gradient with respect to this sub-model's scalars.
    ///
    /// * `input` - the uncorrected logit slice the sub-model saw.
    /// * `dloss_dout` - the loss gradient with respect to the corrected slice.
    /// * `grad` - the sub-model's segment of the flat gradient vector.
    #[inline]
    pub fn accumulate_grad(&self, input: &[f64], dloss_dout: &[f64], grad: &mut [f64]) {
        match self {
            Scaling::Linear { .. } => {
                let mut g_alpha = 0.0;
                let mut g_beta = 0.0;
                for (g, z) in dloss_dout.iter().zip(input) {
                    g_alpha += g * z;
                    g_beta += g;
                }
                grad[0] += g_alpha;
                grad[1] += g_beta;
            }
            Scaling::Temperature { temperature } => {
                // d(z/t)/dt = -z / t^2
                let t_sq = temperature * temperature;
                let mut g_t = 0.0;
                for (g, z) in dloss_dout.iter().zip(input) {
                    g_t -= g * z / t_sq;
                }
                grad[0] += g_t;
            }
        }
    }
}
