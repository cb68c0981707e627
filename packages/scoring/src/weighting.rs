//! Temporal weighting engine.
//!
//! Each incident decays exponentially with age so recent activity dominates
//! a cell's score. Ages are measured against a single `now` captured once
//! per run.

use std::f64::consts::LN_2;

use chrono::{DateTime, Utc};
use safety_map_source_models::CrimeRecord;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A validated record paired with its age and recency weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedRecord {
    /// The underlying incident.
    pub record: CrimeRecord,
    /// Fractional days between the incident and the run's `now`.
    pub days_since: f64,
    /// Recency weight in `(0, 1]`.
    pub weight: f64,
}

/// Fractional days from `occurred_at` to `now`, floored at zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn days_since(occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - occurred_at).num_milliseconds().max(0);
    millis as f64 / MILLIS_PER_DAY
}

/// `exp(-days_since * ln 2 / half_life_days)`: 1.0 today, 0.5 after one
/// half-life, strictly decreasing after that.
#[must_use]
pub fn time_weight(days_since: f64, half_life_days: f64) -> f64 {
    (-days_since * LN_2 / half_life_days).exp()
}

/// Attaches age and weight to every record.
#[must_use]
pub fn weight_records(
    records: Vec<CrimeRecord>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> Vec<WeightedRecord> {
    records
        .into_iter()
        .map(|record| {
            let days_since = days_since(record.occurred_at, now);
            WeightedRecord {
                weight: time_weight(days_since, half_life_days),
                days_since,
                record,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};

    use super::*;
    use crate::config::HALF_LIFE_DAYS;

    #[test]
    fn weight_is_one_today_and_half_at_half_life() {
        assert!((time_weight(0.0, HALF_LIFE_DAYS) - 1.0).abs() < 1e-12);
        assert!((time_weight(180.0, HALF_LIFE_DAYS) - 0.5).abs() < 1e-12);
        assert!((time_weight(360.0, HALF_LIFE_DAYS) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn weight_is_monotonic_and_positive() {
        let mut previous = time_weight(0.0, HALF_LIFE_DAYS);
        for day in 1..=2_000 {
            let weight = time_weight(f64::from(day), HALF_LIFE_DAYS);
            assert!(weight < previous, "not decreasing at day {day}");
            assert!(weight > 0.0 && weight <= 1.0);
            previous = weight;
        }
    }

    #[test]
    fn days_since_is_fractional() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let at = now - Duration::hours(36);
        assert!((days_since(at, now) - 1.5).abs() < 1e-12);
        assert!(days_since(now + Duration::hours(1), now).abs() < f64::EPSILON);
    }

    #[test]
    fn weights_records_against_one_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let records = vec![
            CrimeRecord::new(now, 34.05, -118.25, "330"),
            CrimeRecord::new(now - Duration::days(180), 34.05, -118.25, "330"),
        ];
        let weighted = weight_records(records, now, HALF_LIFE_DAYS);
        assert!((weighted[0].weight - 1.0).abs() < 1e-12);
        assert!((weighted[1].weight - 0.5).abs() < 1e-12);
        assert!((weighted[1].days_since - 180.0).abs() < 1e-12);
    }
}
