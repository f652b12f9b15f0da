//! Logit extraction
//!
//! Runs a frozen scorer over a validation loader and concatenates the
//! per-batch logits and labels into one batch, in loader iteration order.
use crate::data::LogitBatch;
use crate::errors::CalibrationError;

/// A frozen scoring model, usually a feature extractor plus a final linear
/// head without activation. Scoring must not mutate the model.
pub trait Scorer {
    /// One batch of inputs as produced by the loader.
    type Input;

    /// Score a batch of inputs, returning one logit row per example.
    fn score(&self, inputs: &Self::Input) -> LogitBatch;
}

/// Run `scorer` over every `(inputs, targets)` batch of `loader` and
/// concatenate the outputs.
///
/// The label at position `i` of the returned vector corresponds to row `i` of
/// the returned logits. Returns a [`CalibrationError::DimensionMismatch`] if a
/// batch's class width disagrees with the first batch, or if a batch's row
/// count differs from its target count.
pub fn extract_logits<S, I>(scorer: &S, loader: I) -> Result<(LogitBatch, Vec<usize>), CalibrationError>
where
    S: Scorer,
    I: IntoIterator<Item = (S::Input, Vec<usize>)>,
{
    let mut logits: Option<LogitBatch> = None;
    let mut labels: Vec<usize> = Vec::new();

    for (batch_idx, (inputs, targets)) in loader.into_iter().enumerate() {
        let batch = scorer.score(&inputs);
        if batch.rows != targets.len() {
            return Err(CalibrationError::DimensionMismatch(batch_idx, targets.len(), batch.rows));
        }
        match logits.as_mut() {
            None => logits = Some(batch),
            Some(acc) => {
                if batch.cols != acc.cols {
                    return Err(CalibrationError::DimensionMismatch(batch_idx, acc.cols, batch.cols));
                }
                acc.data.extend_from_slice(&batch.data);
                acc.rows += batch.rows;
            }
        }
        labels.extend(targets);
    }

    Ok((logits.unwrap_or_else(|| LogitBatch::new(0)), labels))
}
