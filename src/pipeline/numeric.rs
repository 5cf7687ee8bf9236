//! Shared activation helpers.

use ndarray::Array1;

use super::PredictionError;

/// Numerically stable softmax (max subtraction).
///
/// `stage` names the caller in the error when scores contain NaN/inf or the
/// input is empty.
pub fn softmax(scores: &Array1<f32>, stage: &'static str) -> Result<Array1<f32>, PredictionError> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(PredictionError::NonFinite { stage });
    }

    let exp = scores.mapv(|s| (s - max).exp());
    let sum = exp.sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(PredictionError::NonFinite { stage });
    }

    Ok(exp / sum)
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
