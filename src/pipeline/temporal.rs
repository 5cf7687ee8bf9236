//! Relative-time features per visit.
//!
//! `log_prev = log1p(days since previous visit)` and
//! `log_start = log1p(days since first visit)`, both zero for the first visit.
//! Negative deltas are legal down to (but excluding) -1 day; anything at or
//! below that is reported instead of clamped.

use chrono::NaiveDate;
use serde::Serialize;

use super::PredictionError;

/// Number of temporal features appended to each visit embedding.
pub const TEMPORAL_FEATURE_DIM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemporalFeature {
    pub log_prev: f64,
    pub log_start: f64,
}

impl TemporalFeature {
    pub const ZERO: Self = Self {
        log_prev: 0.0,
        log_start: 0.0,
    };

    pub fn to_array(self) -> [f32; TEMPORAL_FEATURE_DIM] {
        [self.log_prev as f32, self.log_start as f32]
    }
}

/// Encode an ordered sequence of concrete dates into log-delta features.
pub fn encode_deltas(dates: &[NaiveDate]) -> Result<Vec<TemporalFeature>, PredictionError> {
    let Some(&first) = dates.first() else {
        return Ok(Vec::new());
    };

    let mut prev = first;
    let mut features = Vec::with_capacity(dates.len());
    for (index, &date) in dates.iter().enumerate() {
        let delta_prev = (date - prev).num_days() as f64;
        let delta_start = (date - first).num_days() as f64;

        features.push(TemporalFeature {
            log_prev: checked_log1p(index, "log_prev", delta_prev)?,
            log_start: checked_log1p(index, "log_start", delta_start)?,
        });
        prev = date;
    }

    Ok(features)
}

fn checked_log1p(index: usize, feature: &'static str, delta_days: f64) -> Result<f64, PredictionError> {
    if delta_days <= -1.0 {
        return Err(PredictionError::NumericDomain {
            index,
            feature,
            delta_days,
        });
    }
    Ok(delta_days.ln_1p())
}
