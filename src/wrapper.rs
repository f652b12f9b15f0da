//! Calibration wrapper
//!
//! Composes per-range sub-models into one piecewise correction over a full
//! logit row. Ranges are registered in order and are assumed to partition the
//! class-index space with no overlap; this is not validated and is the
//! caller's responsibility.
use crate::data::LogitBatch;
use crate::errors::CalibrationError;
use crate::scaling::{Calibration, Scaling};
use crate::utils::log_sum_exp;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One sub-model bound to its class-index range `[start, end)`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RangedScaling {
    pub scaling: Scaling,
    pub start: usize,
    pub end: usize,
}

/// An ordered collection of per-range calibration sub-models, callable as a
/// drop-in post-processing layer over a classifier's logits.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CalibrationWrapper {
    models: Vec<RangedScaling>,
}

impl CalibrationWrapper {
    pub fn new() -> Self {
        CalibrationWrapper::default()
    }

    /// Build a wrapper with one identity-initialized sub-model per range.
    pub fn over_ranges(indexes: &[(usize, usize)], calibration: Calibration) -> Self {
        let mut wrapper = CalibrationWrapper::new();
        for (start, end) in indexes {
            wrapper.add_model(Scaling::new(calibration), *start, *end);
        }
        wrapper
    }

    /// Register a sub-model for the class-index range `[start, end)`.
    pub fn add_model(&mut self, scaling: Scaling, start: usize, end: usize) {
        self.models.push(RangedScaling { scaling, start, end });
    }

    /// The registered sub-models, in registration order.
    pub fn models(&self) -> &[RangedScaling] {
        &self.models
    }

    /// Total width covered by the registered ranges. Equals the input width
    /// when the ranges form a covering partition.
    pub fn width(&self) -> usize {
        self.models.iter().map(|m| m.end - m.start).sum()
    }

    /// Total number of learnable scalars across all sub-models.
    pub fn n_params(&self) -> usize {
        self.models.iter().map(|m| m.scaling.n_params()).sum()
    }

    /// Flatten the learnable scalars into a single vector, in registration
    /// order.
    pub fn params(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_params());
        for m in &self.models {
            m.scaling.push_params(&mut out);
        }
        out
    }

    /// Overwrite all learnable scalars from a flat vector, in registration
    /// order.
    pub fn set_params(&mut self, params: &[f64]) {
        let mut cursor = 0;
        for m in self.models.iter_mut() {
            let n = m.scaling.n_params();
            m.scaling.set_params(&params[cursor..cursor + n]);
            cursor += n;
        }
    }

    /// Correct one logit row, writing the concatenated corrected slices into
    /// `out`.
    fn transform_row(&self, input: &[f64], out: &mut [f64]) {
        let mut cursor = 0;
        for m in &self.models {
            let w = m.end - m.start;
            m.scaling.apply_into(&input[m.start..m.end], &mut out[cursor..cursor + w]);
            cursor += w;
        }
    }

    /// Apply the piecewise correction to a full logit batch.
    ///
    /// Each row is sliced per registered range, corrected by the range's
    /// sub-model, and the corrected slices are concatenated. Example order is
    /// preserved; for a covering partition the output width equals the input
    /// width.
    pub fn transform(&self, logits: &LogitBatch, parallel: bool) -> LogitBatch {
        let width = self.width();
        let mut data = vec![0.0; logits.rows * width];
        if parallel {
            data.par_chunks_mut(width)
                .enumerate()
                .for_each(|(i, out)| self.transform_row(logits.row(i), out));
        } else {
            for (i, out) in data.chunks_mut(width).enumerate() {
                self.transform_row(logits.row(i), out);
            }
        }
        LogitBatch::from_vec(data, logits.rows, width)
    }

    /// Apply the correction and softmax each corrected row, returning
    /// per-class probabilities in a row major batch.
    pub fn predict_proba(&self, logits: &LogitBatch, parallel: bool) -> LogitBatch {
        let mut corrected = self.transform(logits, parallel);
        let cols = corrected.cols;
        let softmax_row = |row: &mut [f64]| {
            let lse = log_sum_exp(&row[..]);
            for z in row.iter_mut() {
                *z = (*z - lse).exp();
            }
        };
        if parallel {
            corrected.data.par_chunks_mut(cols).for_each(|row| softmax_row(row));
        } else {
            for row in corrected.data.chunks_mut(cols) {
                softmax_row(row);
            }
        }
        corrected
    }

    /// Mean softmax cross-entropy of the corrected logits against `labels`,
    /// together with its gradient with respect to the flat parameter vector.
    ///
    /// Labels index into the corrected row, which equals the class index for
    /// an ordered covering partition.
    pub fn loss_and_grad(&self, logits: &LogitBatch, labels: &[usize], parallel: bool) -> (f64, Vec<f64>) {
        let width = self.width();
        let n_params = self.n_params();

        let row_contribution = |i: usize| -> (f64, Vec<f64>) {
            let input = logits.row(i);
            let mut corrected = vec![0.0; width];
            self.transform_row(input, &mut corrected);

            let lse = log_sum_exp(&corrected);
            let loss = lse - corrected[labels[i]];

            // d(loss)/d(corrected_j) = softmax_j - 1{j == label}
            let mut dloss = corrected;
            for z in dloss.iter_mut() {
                *z = (*z - lse).exp();
            }
            dloss[labels[i]] -= 1.0;

            let mut grad = vec![0.0; n_params];
            let mut out_cursor = 0;
            let mut param_cursor = 0;
            for m in &self.models {
                let w = m.end - m.start;
                let n = m.scaling.n_params();
                m.scaling.accumulate_grad(
                    &input[m.start..m.end],
                    &dloss[out_cursor..out_cursor + w],
                    &mut grad[param_cursor..param_cursor + n],
                );
                out_cursor += w;
                param_cursor += n;
            }
            (loss, grad)
        };

        let add = |(loss_a, mut grad_a): (f64, Vec<f64>), (loss_b, grad_b): (f64, Vec<f64>)| {
            for (a, b) in grad_a.iter_mut().zip(&grad_b) {
                *a += b;
            }
            (loss_a + loss_b, grad_a)
        };

        let identity = || (0.0, vec![0.0; n_params]);
        let (loss_sum, grad_sum) = if parallel {
            (0..logits.rows)
                .into_par_iter()
                .map(row_contribution)
                .reduce(identity, add)
        } else {
            (0..logits.rows).map(row_contribution).fold(identity(), add)
        };

        let scale = 1.0 / logits.rows as f64;
        (loss_sum * scale, grad_sum.iter().map(|g| g * scale).collect())
    }

    /// Dump the wrapper to a json string.
    pub fn json_dump(&self) -> Result<String, CalibrationError> {
        serde_json::to_string(self).map_err(|e| CalibrationError::Serialization(e.to_string()))
    }

    /// Load a wrapper from a json string.
    pub fn from_json(json_str: &str) -> Result<Self, CalibrationError> {
        serde_json::from_str(json_str).map_err(|e| CalibrationError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> LogitBatch {
        LogitBatch::from_vec(vec![1.0, -0.5, 2.0, 0.0, 0.5, 1.5, -1.0, 3.0], 2, 4)
    }

    #[test]
    fn test_untrained_wrapper_is_identity() {
        let wrapper = CalibrationWrapper::over_ranges(&[(0, 2), (2, 4)], Calibration::Linear);
        let logits = sample_batch();
        let out = wrapper.transform(&logits, false);
        assert_eq!(out, logits);
    }

    #[test]
    fn test_output_width_matches_input_width() {
        for partition in [vec![(0, 4)], vec![(0, 1), (1, 4)], vec![(0, 2), (2, 3), (3, 4)]] {
            let wrapper = CalibrationWrapper::over_ranges(&partition, Calibration::Temperature);
            let logits = sample_batch();
            let out = wrapper.transform(&logits, false);
            assert_eq!(out.cols, logits.cols);
            assert_eq!(out.rows, logits.rows);
        }
    }

    #[test]
    fn test_sub_models_act_on_their_ranges_only() {
        let mut wrapper = CalibrationWrapper::new();
        wrapper.add_model(Scaling::Linear { alpha: 1.0, beta: 0.0 }, 0, 2);
        wrapper.add_model(Scaling::Linear { alpha: 2.0, beta: 1.0 }, 2, 4);
        let logits = sample_batch();
        let out = wrapper.transform(&logits, false);
        assert_eq!(out.row(0), &[1.0, -0.5, 5.0, 1.0]);
        assert_eq!(out.row(1), &[0.5, 1.5, -1.0, 7.0]);
    }

    #[test]
    fn test_parallel_transform_matches_serial() {
        let mut wrapper = CalibrationWrapper::new();
        wrapper.add_model(Scaling::Temperature { temperature: 2.0 }, 0, 2);
        wrapper.add_model(Scaling::Linear { alpha: 0.5, beta: -1.0 }, 2, 4);
        let logits = sample_batch();
        assert_eq!(wrapper.transform(&logits, false), wrapper.transform(&logits, true));
    }

    #[test]
    fn test_params_round_trip() {
        let mut wrapper = CalibrationWrapper::over_ranges(&[(0, 2), (2, 4)], Calibration::Linear);
        assert_eq!(wrapper.n_params(), 4);
        wrapper.set_params(&[0.9, 0.1, 1.1, -0.2]);
        assert_eq!(wrapper.params(), vec![0.9, 0.1, 1.1, -0.2]);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let wrapper = CalibrationWrapper::over_ranges(&[(0, 4)], Calibration::Temperature);
        let probs = wrapper.predict_proba(&sample_batch(), false);
        for i in 0..probs.rows {
            let total: f64 = probs.row(i).iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_loss_at_identity_equals_plain_cross_entropy() {
        let wrapper = CalibrationWrapper::over_ranges(&[(0, 4)], Calibration::Linear);
        let logits = sample_batch();
        let labels = vec![2, 3];
        let (loss, _) = wrapper.loss_and_grad(&logits, &labels, false);

        let mut expected = 0.0;
        for (i, label) in labels.iter().enumerate() {
            let row = logits.row(i);
            let lse = row.iter().map(|z| z.exp()).sum::<f64>().ln();
            expected += lse - row[*label];
        }
        expected /= labels.len() as f64;
        assert!((loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let mut wrapper = CalibrationWrapper::new();
        wrapper.add_model(Scaling::Linear { alpha: 0.8, beta: 0.3 }, 0, 2);
        wrapper.add_model(Scaling::Temperature { temperature: 1.7 }, 2, 4);
        let logits = sample_batch();
        let labels = vec![1, 3];

        let (_, grad) = wrapper.loss_and_grad(&logits, &labels, false);
        let params = wrapper.params();
        let eps = 1e-6;
        for k in 0..params.len() {
            let mut plus = wrapper.clone();
            let mut minus = wrapper.clone();
            let mut p = params.clone();
            p[k] += eps;
            plus.set_params(&p);
            p[k] -= 2.0 * eps;
            minus.set_params(&p);
            let (loss_plus, _) = plus.loss_and_grad(&logits, &labels, false);
            let (loss_minus, _) = minus.loss_and_grad(&logits, &labels, false);
            let numeric = (loss_plus - loss_minus) / (2.0 * eps);
            assert!(
                (grad[k] - numeric).abs() < 1e-6,
                "parameter {}: analytic {} vs numeric {}",
                k,
                grad[k],
                numeric
            );
        }
    }

    #[test]
    fn test_parallel_loss_matches_serial() {
        let mut wrapper = CalibrationWrapper::new();
        wrapper.add_model(Scaling::Linear { alpha: 1.2, beta: -0.1 }, 0, 3);
        wrapper.add_model(Scaling::Temperature { temperature: 0.9 }, 3, 4);
        let logits = sample_batch();
        let labels = vec![0, 2];
        let (loss_s, grad_s) = wrapper.loss_and_grad(&logits, &labels, false);
        let (loss_p, grad_p) = wrapper.loss_and_grad(&logits, &labels, true);
        assert!((loss_s - loss_p).abs() < 1e-12);
        for (a, b) in grad_s.iter().zip(&grad_p) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let mut wrapper = CalibrationWrapper::over_ranges(&[(0, 2), (2, 4)], Calibration::Linear);
        wrapper.set_params(&[0.9, 0.1, 1.1, -0.2]);
        let json = wrapper.json_dump().unwrap();
        let loaded = CalibrationWrapper::from_json(&json).unwrap();
        assert_eq!(wrapper, loaded);
    }
}
