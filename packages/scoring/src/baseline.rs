//! Citywide baseline calculator.
//!
//! The baseline rate of a metric is the share of all recency weight that
//! falls on qualifying incidents. Every cell is judged against it, so it is
//! computed once, before any cell, and never changes afterwards.

use std::collections::BTreeMap;

use safety_map_metrics_models::{MetricDefinition, MetricType};

use crate::tally::{MetricTally, total_weight};
use crate::weighting::WeightedRecord;

/// Baseline for a single metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricBaseline {
    /// Qualifying weight divided by total weight; 0 when there is no
    /// weight at all.
    pub rate: f64,
    /// Aggregates over qualifying records.
    pub tally: MetricTally,
    /// Qualifying incidents per day over the observed span.
    pub crimes_per_day: f64,
}

/// Frozen per-metric baselines for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CitywideBaseline {
    total_weight: f64,
    metrics: BTreeMap<MetricType, MetricBaseline>,
}

impl CitywideBaseline {
    /// Computes the baseline for every definition over the full record set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(
        records: &[WeightedRecord],
        definitions: &[MetricDefinition],
        recent_window_days: f64,
    ) -> Self {
        let total_weight = total_weight(records);
        let observed_days = records
            .iter()
            .map(|w| w.days_since)
            .fold(0.0_f64, f64::max)
            .max(1.0);

        let metrics = definitions
            .iter()
            .map(|definition| {
                let tally = MetricTally::of(records, definition, recent_window_days);
                let rate = if total_weight > 0.0 {
                    tally.weighted_sum / total_weight
                } else {
                    0.0
                };
                let baseline = MetricBaseline {
                    rate,
                    tally,
                    crimes_per_day: tally.count as f64 / observed_days,
                };

                log::info!(
                    "{} baseline: {} incidents ({} in last {recent_window_days} days), \
                     {:.1}/day, weighted rate {rate:.4}",
                    definition.metric_type,
                    tally.count,
                    tally.recent_count,
                    baseline.crimes_per_day,
                );

                (definition.metric_type, baseline)
            })
            .collect();

        Self {
            total_weight,
            metrics,
        }
    }

    /// Builds a baseline from known rates, for callers that already have
    /// them (replays, tests).
    #[must_use]
    pub fn from_rates(rates: impl IntoIterator<Item = (MetricType, f64)>) -> Self {
        let metrics = rates
            .into_iter()
            .map(|(metric_type, rate)| {
                (
                    metric_type,
                    MetricBaseline {
                        rate,
                        tally: MetricTally::default(),
                        crimes_per_day: 0.0,
                    },
                )
            })
            .collect();
        Self {
            total_weight: 0.0,
            metrics,
        }
    }

    /// Sum of recency weights over every record in the run.
    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// The baseline for one metric, if it was computed.
    #[must_use]
    pub fn get(&self, metric_type: MetricType) -> Option<&MetricBaseline> {
        self.metrics.get(&metric_type)
    }

    /// The baseline rate for one metric; 0 when unknown.
    #[must_use]
    pub fn rate(&self, metric_type: MetricType) -> f64 {
        self.get(metric_type).map_or(0.0, |b| b.rate)
    }

    /// Iterates baselines in metric order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricType, &MetricBaseline)> {
        self.metrics.iter().map(|(k, v)| (*k, v))
    }
}
