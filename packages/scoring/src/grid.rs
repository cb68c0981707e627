//! Spatial grid aggregator.
//!
//! Buckets weighted records into fixed-size latitude/longitude cells and
//! computes each cell's local rate per metric. Only cells that received at
//! least one record exist.

use std::collections::BTreeMap;

use safety_map_metrics_models::{MetricDefinition, MetricType};
use safety_map_source_models::BoundingBox;

use crate::tally::{MetricTally, total_weight};
use crate::weighting::WeightedRecord;

/// Absorbs binary representation error so `34.05 / 0.01` lands in bucket
/// 3405 rather than 3404.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Decimal places kept on cell centers.
const CENTER_PRECISION: f64 = 1e6;

/// Integer bucket index of a coordinate at `resolution` degrees.
///
/// A coordinate exactly on a boundary belongs to the cell whose lower bound
/// equals it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn bucket_index(coordinate: f64, resolution: f64) -> i64 {
    (coordinate / resolution + BOUNDARY_EPSILON).floor() as i64
}

/// Identity of a grid cell. Orders by latitude band, then longitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    /// Latitude bucket.
    pub lat_index: i64,
    /// Longitude bucket.
    pub lon_index: i64,
}

impl CellId {
    /// The cell containing a point.
    #[must_use]
    pub fn containing(latitude: f64, longitude: f64, resolution: f64) -> Self {
        Self {
            lat_index: bucket_index(latitude, resolution),
            lon_index: bucket_index(longitude, resolution),
        }
    }

    /// Latitude/longitude of the cell's center.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(self, resolution: f64) -> (f64, f64) {
        let center = |index: i64| {
            let value = (index as f64).mul_add(resolution, resolution / 2.0);
            (value * CENTER_PRECISION).round() / CENTER_PRECISION
        };
        (center(self.lat_index), center(self.lon_index))
    }
}

/// A non-empty cell and the records it owns.
#[derive(Debug, Clone)]
pub struct GridCell<'a> {
    /// Which cell this is.
    pub id: CellId,
    /// Records inside the cell, in input order.
    pub records: Vec<&'a WeightedRecord>,
}

impl GridCell<'_> {
    /// Sum of recency weights in the cell.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        total_weight(self.records.iter().copied())
    }
}

/// Local statistics for one (cell, metric) pair with at least one
/// qualifying record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetricStats {
    /// Metric the statistics belong to.
    pub metric_type: MetricType,
    /// Aggregates over the cell's qualifying records.
    pub tally: MetricTally,
    /// Sum of all recency weights in the cell.
    pub cell_weight: f64,
    /// `tally.weighted_sum / cell_weight`.
    pub local_rate: f64,
}

/// Computes local rates for every metric with at least one qualifying
/// record in `cell`. Metrics without one are omitted.
#[must_use]
pub fn aggregate_cell(
    cell: &GridCell<'_>,
    definitions: &[MetricDefinition],
    recent_window_days: f64,
) -> Vec<CellMetricStats> {
    let cell_weight = cell.total_weight();

    definitions
        .iter()
        .filter_map(|definition| {
            let tally = MetricTally::of(
                cell.records.iter().copied(),
                definition,
                recent_window_days,
            );
            if tally.is_empty() {
                return None;
            }
            let local_rate = if cell_weight > 0.0 {
                tally.weighted_sum / cell_weight
            } else {
                0.0
            };
            Some(CellMetricStats {
                metric_type: definition.metric_type,
                tally,
                cell_weight,
                local_rate,
            })
        })
        .collect()
}

/// Records bucketed into non-empty cells.
#[derive(Debug, Clone)]
pub struct SpatialGrid<'a> {
    cells: BTreeMap<CellId, Vec<&'a WeightedRecord>>,
}

impl<'a> SpatialGrid<'a> {
    /// Buckets every record that lies inside `bbox`.
    #[must_use]
    pub fn build(records: &'a [WeightedRecord], bbox: &BoundingBox, resolution: f64) -> Self {
        let mut cells: BTreeMap<CellId, Vec<&'a WeightedRecord>> = BTreeMap::new();
        let mut outside = 0_usize;

        for weighted in records {
            let record = &weighted.record;
            if !bbox.contains(record.latitude, record.longitude) {
                outside += 1;
                continue;
            }
            cells
                .entry(CellId::containing(record.latitude, record.longitude, resolution))
                .or_default()
                .push(weighted);
        }

        if outside > 0 {
            log::warn!("{outside} records outside the bounding box were not gridded");
        }
        log::info!(
            "Bucketed {} records into {} cells at {resolution}°",
            records.len() - outside,
            cells.len()
        );

        Self { cells }
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no record landed in any cell.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates cells in `(lat_index, lon_index)` order.
    pub fn cells(&self) -> impl Iterator<Item = GridCell<'a>> + '_ {
        self.cells.iter().map(|(id, records)| GridCell {
            id: *id,
            records: records.clone(),
        })
    }
}
