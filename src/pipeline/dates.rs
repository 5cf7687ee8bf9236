//! Visit date parsing and imputation.
//!
//! Missing dates are filled on a numeric time axis (seconds since the Unix
//! epoch): interior gaps by linear interpolation between the bracketing known
//! dates, leading and trailing gaps by linear extrapolation of the nearest
//! known segment. Cases with fewer than two known dates carry no usable
//! spacing and get a synthetic monthly sequence instead.

use chrono::{DateTime, NaiveDate, NaiveTime};

use super::PredictionError;

/// Input format for visit dates, e.g. `10Jan2024` or `9Apr2024`.
pub const VISIT_DATE_FORMAT: &str = "%d%b%Y";

/// First year of the synthetic fallback sequence.
const FALLBACK_START_YEAR: i32 = 2024;

const SECONDS_PER_DAY: f64 = 86_400.0;

// ═══════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════

/// Parse one raw visit date. Blank strings count as missing.
pub fn parse_visit_date(index: usize, raw: Option<&str>) -> Result<Option<NaiveDate>, PredictionError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let malformed = || PredictionError::DateParse {
        index,
        value: raw.to_string(),
    };
    if !has_visit_date_shape(raw) {
        return Err(malformed());
    }
    NaiveDate::parse_from_str(raw, VISIT_DATE_FORMAT)
        .map(Some)
        .map_err(|_| malformed())
}

/// `%Y` alone accepts signed or short years; require 1-2 day digits,
/// a 3-letter month and exactly 4 year digits.
fn has_visit_date_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let Some(day_len) = bytes.len().checked_sub(7) else {
        return false;
    };
    let (day, rest) = bytes.split_at(day_len);
    let (month, year) = rest.split_at(3);
    (1..=2).contains(&day.len())
        && day.iter().all(u8::is_ascii_digit)
        && month.iter().all(u8::is_ascii_alphabetic)
        && year.iter().all(u8::is_ascii_digit)
}

/// Parse every raw date of a case, failing on the first malformed entry.
pub fn parse_visit_dates(raw: &[Option<String>]) -> Result<Vec<Option<NaiveDate>>, PredictionError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| parse_visit_date(index, value.as_deref()))
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Imputation
// ═══════════════════════════════════════════════════════════

/// Resolve every visit to a concrete date, preserving known dates and order.
///
/// Known dates are never re-sorted; out-of-order input produces an
/// out-of-order result, which the temporal encoder reports.
pub fn impute_dates(dates: &[Option<NaiveDate>]) -> Result<Vec<NaiveDate>, PredictionError> {
    let known: Vec<(usize, f64)> = dates
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.map(|d| (i, to_timestamp(d))))
        .collect();

    if known.len() <= 1 {
        return fallback_sequence(dates.len());
    }

    if known.len() == dates.len() {
        return Ok(dates.iter().flatten().copied().collect());
    }

    let n = dates.len();
    let mut stamps = vec![0.0f64; n];
    for &(i, t) in &known {
        stamps[i] = t;
    }

    for pair in known.windows(2) {
        let (i0, t0) = pair[0];
        let (i1, t1) = pair[1];
        let slope = (t1 - t0) / (i1 - i0) as f64;
        for (i, slot) in stamps.iter_mut().enumerate().take(i1).skip(i0 + 1) {
            *slot = slope * (i - i0) as f64 + t0;
        }
    }

    // Leading gap: walk backwards with the per-visit step of the first known segment.
    let first = known[0].0;
    if first > 0 {
        let step = stamps[first + 1] - stamps[first];
        for i in (0..first).rev() {
            stamps[i] = stamps[i + 1] - step;
        }
    }

    // Trailing gap: walk forwards with the per-visit step of the last known segment.
    let last = known[known.len() - 1].0;
    if last + 1 < n {
        let step = stamps[last] - stamps[last - 1];
        for i in last + 1..n {
            stamps[i] = stamps[i - 1] + step;
        }
    }

    stamps
        .into_iter()
        .enumerate()
        .map(|(index, t)| from_timestamp(t).ok_or(PredictionError::DateOutOfRange { index }))
        .collect()
}

/// Synthetic dates used when a case has no usable spacing: the first of each
/// month starting January 2024, one month per visit.
pub fn fallback_sequence(n: usize) -> Result<Vec<NaiveDate>, PredictionError> {
    (0..n)
        .map(|index| {
            let year = i32::try_from(index / 12)
                .ok()
                .and_then(|offset| FALLBACK_START_YEAR.checked_add(offset));
            let month = (index % 12) as u32 + 1;
            year.and_then(|y| NaiveDate::from_ymd_opt(y, month, 1))
                .ok_or(PredictionError::DateOutOfRange { index })
        })
        .collect()
}

fn to_timestamp(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::default()).and_utc().timestamp() as f64
}

/// Back to a calendar date; fractional days are floored.
fn from_timestamp(seconds: f64) -> Option<NaiveDate> {
    if !seconds.is_finite() {
        return None;
    }
    let days = (seconds / SECONDS_PER_DAY).floor();
    let secs = days * SECONDS_PER_DAY;
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.date_naive())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
