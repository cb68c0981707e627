//! Per-metric aggregates over a set of weighted records.
//!
//! The citywide baseline and every grid cell reduce their records the same
//! way, so both go through [`MetricTally::of`].

use safety_map_metrics_models::MetricDefinition;

use crate::weighting::WeightedRecord;

/// Sums over the records that qualify for one metric.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricTally {
    /// Sum of recency weights of qualifying records.
    pub weighted_sum: f64,
    /// Number of qualifying records.
    pub count: u64,
    /// Qualifying records inside the recent window.
    pub recent_count: u64,
    /// Age in days of the oldest qualifying record.
    pub max_days_since: f64,
}

impl MetricTally {
    /// Tallies the records that match `definition`'s codes and time filter.
    pub fn of<'a>(
        records: impl IntoIterator<Item = &'a WeightedRecord>,
        definition: &MetricDefinition,
        recent_window_days: f64,
    ) -> Self {
        records
            .into_iter()
            .filter(|w| definition.qualifies(&w.record.category_code, w.record.hour_of_day))
            .fold(Self::default(), |mut tally, w| {
                tally.weighted_sum += w.weight;
                tally.count += 1;
                if w.days_since <= recent_window_days {
                    tally.recent_count += 1;
                }
                tally.max_days_since = tally.max_days_since.max(w.days_since);
                tally
            })
    }

    /// Whether at least one record qualified.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Sum of recency weights over all records.
pub fn total_weight<'a>(records: impl IntoIterator<Item = &'a WeightedRecord>) -> f64 {
    records.into_iter().map(|w| w.weight).sum()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use safety_map_metrics_models::{MetricType, TimeFilter};
    use safety_map_source_models::CrimeRecord;

    use super::*;

    fn weighted(code: &str, hour: u32, days_since: f64, weight: f64) -> WeightedRecord {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap();
        WeightedRecord {
            record: CrimeRecord::new(at, 34.05, -118.25, code),
            days_since,
            weight,
        }
    }

    #[test]
    fn tallies_only_qualifying_records() {
        let night = MetricDefinition {
            metric_type: MetricType::Night,
            question: "q".to_string(),
            description: "d".to_string(),
            category_codes: ["210".to_string()].into_iter().collect(),
            time_filter: Some(TimeFilter::HourRange { start: 18, end: 6 }),
        };
        let records = [
            weighted("210", 22, 10.0, 0.9),
            weighted("210", 12, 5.0, 0.95),
            weighted("330", 23, 1.0, 1.0),
            weighted("210", 2, 200.0, 0.4),
        ];

        let tally = MetricTally::of(&records, &night, 90.0);
        assert_eq!(tally.count, 2);
        assert_eq!(tally.recent_count, 1);
        assert!((tally.weighted_sum - 1.3).abs() < 1e-12);
        assert!((tally.max_days_since - 200.0).abs() < f64::EPSILON);
        assert!((total_weight(&records) - 3.25).abs() < 1e-12);
    }
}
