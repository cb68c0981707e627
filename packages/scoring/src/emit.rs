//! Metric emitter: turns scored (cell, metric) pairs into output records.

use chrono::{DateTime, Duration, Utc};
use safety_map_metrics_models::{MetricDefinition, RiskLevel, SafetyMetric, Trend};
use uuid::Uuid;

use crate::grid::{CellId, CellMetricStats};

/// Everything decided about one (cell, metric) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPair {
    /// Cell the pair belongs to.
    pub cell: CellId,
    /// Local statistics for the pair.
    pub stats: CellMetricStats,
    /// Local rate over citywide rate.
    pub relative_rate: f64,
    /// Bucket derived from the relative rate.
    pub risk_level: RiskLevel,
    /// Recent-vs-historical direction.
    pub trend: Trend,
}

/// Human-readable summary stored alongside the score.
#[must_use]
pub fn describe(
    pair: &ScoredPair,
    definition: &MetricDefinition,
    recent_window_days: f64,
) -> String {
    format!(
        "{}. {} [{} incidents ({} in last {recent_window_days} days) {}, {:.2}x city average]",
        pair.risk_level,
        definition.description,
        pair.stats.tally.count,
        pair.stats.tally.recent_count,
        pair.trend.arrow(),
        pair.relative_rate,
    )
}

/// Builds the output record for a pair, stamped with the run's `now`.
#[must_use]
pub fn emit_metric(
    pair: &ScoredPair,
    definition: &MetricDefinition,
    resolution: f64,
    recent_window_days: f64,
    now: DateTime<Utc>,
    expiry_days: i64,
) -> SafetyMetric {
    let (latitude, longitude) = pair.cell.center(resolution);

    SafetyMetric {
        id: Uuid::new_v4().to_string(),
        latitude,
        longitude,
        metric_type: definition.metric_type,
        question: definition.question.clone(),
        score: pair.risk_level.score(),
        risk_level: pair.risk_level,
        trend: pair.trend,
        description: describe(pair, definition, recent_window_days),
        recent_count: pair.stats.tally.recent_count,
        total_count: pair.stats.tally.count,
        relative_rate: pair.relative_rate,
        computed_at: now,
        expires_at: now + Duration::days(expiry_days),
    }
}
