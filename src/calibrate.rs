//! Calibration pipeline
//!
//! Corrects the class-imbalance bias of a frozen classifier: extract logits
//! and labels from a validation loader, build a piecewise wrapper over the
//! caller's class-index ranges, and fit its scalars by minimizing
//! cross-entropy with a bounded quasi-Newton optimizer.
use crate::data::LogitBatch;
use crate::errors::CalibrationError;
use crate::extract::{extract_logits, Scorer};
use crate::optimizer::{FitSummary, Lbfgs};
use crate::scaling::Calibration;
use crate::wrapper::CalibrationWrapper;
use log::{info, warn};
use std::str::FromStr;

/// Fit the wrapper's scalars on an already extracted validation batch.
///
/// Runs at most 50 optimizer steps and writes the resulting parameters back
/// into `wrapper`, whether or not the optimizer's own stopping rule fired.
pub fn fit(
    wrapper: &mut CalibrationWrapper,
    logits: &LogitBatch,
    labels: &[usize],
    parallel: bool,
) -> FitSummary {
    let objective = |params: &[f64]| {
        let mut candidate = wrapper.clone();
        candidate.set_params(params);
        candidate.loss_and_grad(logits, labels, parallel)
    };
    let (params, summary) = Lbfgs::default().minimize(objective, wrapper.params());
    wrapper.set_params(&params);

    if summary.converged {
        info!(
            "Calibration converged after {0} iterations, loss {1:.6} -> {2:.6}.",
            summary.iterations, summary.initial_loss, summary.final_loss
        );
    } else {
        warn!(
            "Reached the iteration limit before convergence, keeping the current parameters (loss {0:.6} -> {1:.6}).",
            summary.initial_loss, summary.final_loss
        );
    }
    summary
}

/// Correct the bias for new classes.
///
/// * `scorer` - the frozen logit extractor, usually convnet + FC without the
///   final activation.
/// * `loader` - the validation batches, as `(inputs, targets)` pairs.
/// * `indexes` - `(start, end)` pairs delimiting the target ranges to
///   calibrate. With several pairs, a different sub-model is fitted per
///   range. Assumed non-overlapping and covering, not validated.
/// * `calibration_type` - `"linear"` or `"temperature"`; anything else is an
///   immediate error.
/// * `parallel` - whether to evaluate rows in parallel during fitting.
///
/// Returns the fitted [`CalibrationWrapper`].
pub fn calibrate<S, I>(
    scorer: &S,
    loader: I,
    indexes: &[(usize, usize)],
    calibration_type: &str,
    parallel: bool,
) -> Result<CalibrationWrapper, CalibrationError>
where
    S: Scorer,
    I: IntoIterator<Item = (S::Input, Vec<usize>)>,
{
    let calibration = Calibration::from_str(calibration_type)?;
    let (logits, labels) = extract_logits(scorer, loader)?;
    if logits.is_empty() {
        return Err(CalibrationError::EmptyValidationSet);
    }

    let mut wrapper = CalibrationWrapper::over_ranges(indexes, calibration);
    fit(&mut wrapper, &logits, &labels, parallel);
    Ok(wrapper)
}
