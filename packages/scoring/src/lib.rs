#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime-to-score aggregation engine.
//!
//! Turns a batch of raw incident records into one [`SafetyMetric`] per
//! (grid cell, safety dimension) pair:
//!
//! 1. normalize raw records, dropping invalid ones
//! 2. weight each incident by recency ([`weighting`])
//! 3. compute the frozen [`baseline::CitywideBaseline`]
//! 4. bucket records into a [`grid::SpatialGrid`]
//! 5. per cell and metric, compare the local rate to the baseline
//!    ([`risk`]) and classify the trend ([`trend`])
//! 6. stamp the results as [`SafetyMetric`]s ([`emit`])
//!
//! Every stage is synchronous and reads the same `now`.

pub mod baseline;
pub mod config;
pub mod emit;
pub mod grid;
pub mod risk;
pub mod tally;
pub mod trend;
pub mod weighting;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use safety_map_metrics_models::{MetricDefinition, MetricType, SafetyMetric};
use safety_map_source::normalize::{DiscardCounts, normalize_records};
use safety_map_source::progress::ProgressCallback;
use safety_map_source_models::{FieldMapping, RawRecord};

use crate::baseline::CitywideBaseline;
use crate::config::ScoringConfig;
use crate::emit::{ScoredPair, emit_metric};
use crate::grid::{GridCell, SpatialGrid, aggregate_cell};
use crate::trend::TrendRates;

/// Errors that abort a scoring run. No metrics are produced when any of
/// these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// The data source supplied nothing.
    #[error("No records supplied")]
    NoRecords,

    /// Every supplied record was dropped during validation.
    #[error("No valid records after validation ({} dropped)", .discards.total())]
    NoValidRecords {
        /// Why the records were dropped.
        discards: DiscardCounts,
    },

    /// A scoring parameter is unusable.
    #[error("Invalid scoring configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// No metric definitions were given.
    #[error("No metric definitions")]
    NoDefinitions,

    /// Two definitions share a metric type.
    #[error("Duplicate metric definition: {metric_type}")]
    DuplicateDefinition {
        /// The repeated type.
        metric_type: MetricType,
    },
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ScoringRun {
    /// One entry per scored (cell, metric) pair, in cell then metric order.
    pub metrics: Vec<SafetyMetric>,
    /// Why raw records were dropped.
    pub discards: DiscardCounts,
    /// The baseline every cell was compared against.
    pub baseline: CitywideBaseline,
    /// Number of non-empty grid cells.
    pub cells_with_data: usize,
    /// Records that survived validation.
    pub valid_records: usize,
    /// The run's reference time.
    pub computed_at: DateTime<Utc>,
}

impl ScoringRun {
    /// Number of emitted metrics per dimension.
    #[must_use]
    pub fn counts_by_type(&self) -> BTreeMap<MetricType, usize> {
        let mut counts = BTreeMap::new();
        for metric in &self.metrics {
            *counts.entry(metric.metric_type).or_insert(0) += 1;
        }
        counts
    }
}

/// Scores every metric with at least one qualifying record in `cell`.
///
/// Cells are independent once the baseline is frozen, so callers may
/// partition cells across workers and call this for each.
#[must_use]
pub fn score_cell(
    cell: &GridCell<'_>,
    definitions: &[MetricDefinition],
    baseline: &CitywideBaseline,
    recent_window_days: f64,
) -> Vec<ScoredPair> {
    aggregate_cell(cell, definitions, recent_window_days)
        .into_iter()
        .map(|stats| {
            let relative_rate =
                risk::relative_rate(stats.local_rate, baseline.rate(stats.metric_type));
            let trend = TrendRates::from_counts(
                stats.tally.recent_count,
                stats.tally.count,
                stats.tally.max_days_since,
                recent_window_days,
            )
            .classify();

            ScoredPair {
                cell: cell.id,
                stats,
                relative_rate,
                risk_level: risk::classify(relative_rate),
                trend,
            }
        })
        .collect()
}

/// Runs the full pipeline over one batch of raw records.
///
/// # Errors
///
/// * [`ScoringError::NoRecords`] if `raw` is empty
/// * [`ScoringError::InvalidConfig`] if `config` fails validation
/// * [`ScoringError::NoDefinitions`] if `definitions` is empty
/// * [`ScoringError::DuplicateDefinition`] if two definitions share a type
/// * [`ScoringError::NoValidRecords`] if validation drops every record
pub fn score_records(
    raw: &[RawRecord],
    mapping: &FieldMapping,
    definitions: &[MetricDefinition],
    config: &ScoringConfig,
    now: DateTime<Utc>,
    progress: &dyn ProgressCallback,
) -> Result<ScoringRun, ScoringError> {
    if raw.is_empty() {
        return Err(ScoringError::NoRecords);
    }
    config.validate()?;
    if definitions.is_empty() {
        return Err(ScoringError::NoDefinitions);
    }
    let mut by_type: BTreeMap<MetricType, &MetricDefinition> = BTreeMap::new();
    for definition in definitions {
        if by_type.insert(definition.metric_type, definition).is_some() {
            return Err(ScoringError::DuplicateDefinition {
                metric_type: definition.metric_type,
            });
        }
    }

    let normalized = normalize_records(raw, mapping, &config.bbox, now);
    let discards = normalized.discards;
    if normalized.records.is_empty() {
        return Err(ScoringError::NoValidRecords { discards });
    }
    let valid_records = normalized.records.len();

    let weighted = weighting::weight_records(normalized.records, now, config.half_life_days);
    let baseline = CitywideBaseline::compute(&weighted, definitions, config.recent_window_days);
    let grid = SpatialGrid::build(&weighted, &config.bbox, config.resolution);

    progress.set_total(grid.len() as u64);
    progress.set_message("Scoring cells".to_string());

    let mut metrics = Vec::new();
    for cell in grid.cells() {
        for pair in score_cell(&cell, definitions, &baseline, config.recent_window_days) {
            if let Some(definition) = by_type.get(&pair.stats.metric_type) {
                metrics.push(emit_metric(
                    &pair,
                    definition,
                    config.resolution,
                    config.recent_window_days,
                    now,
                    config.expiry_days,
                ));
            }
        }
        progress.inc(1);
    }

    log::info!(
        "Scored {} cell/metric pairs across {} cells",
        metrics.len(),
        grid.len()
    );
    progress.finish(format!("{} metrics from {} cells", metrics.len(), grid.len()));

    Ok(ScoringRun {
        metrics,
        discards,
        baseline,
        cells_with_data: grid.len(),
        valid_records,
        computed_at: now,
    })
}
