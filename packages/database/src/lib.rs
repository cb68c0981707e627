#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistence for computed safety metrics.
//!
//! Every run replaces the stored metrics wholesale. A batch is first staged
//! with [`MetricStore::prepare`] and only made visible by
//! [`MetricStore::commit`], so a caller writing to several stores can stage
//! all of them before committing any. Two stores are provided: a `DuckDB` file
//! ([`metrics_db::DuckDbMetricStore`]) and a pretty-printed JSON file
//! ([`json_file::JsonFileMetricStore`]) for handing results to other tools.

pub mod json_file;
pub mod metrics_db;
pub mod paths;

use safety_map_metrics_models::SafetyMetric;

/// Errors that can occur during metric persistence.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (directory creation, file swap).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value could not be turned back into a metric.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// Refused to replace the stored metrics with nothing.
    #[error("Refusing to replace stored metrics with an empty batch")]
    EmptyBatch,

    /// [`MetricStore::commit`] was called without a staged batch.
    #[error("No staged batch to commit")]
    NothingStaged,
}

/// A destination for computed metrics.
pub trait MetricStore {
    /// Short description of where metrics are written, for logs.
    fn location(&self) -> String;

    /// Stages `metrics` without touching the visible contents. Returns the
    /// number of metrics staged. A later `prepare` replaces the staged
    /// batch.
    ///
    /// # Errors
    ///
    /// * [`DbError::EmptyBatch`] if `metrics` is empty
    /// * any underlying storage error; nothing is left staged
    fn prepare(&mut self, metrics: &[SafetyMetric]) -> Result<u64, DbError>;

    /// Replaces every stored metric with the staged batch in one atomic
    /// step. Returns the number of metrics stored.
    ///
    /// # Errors
    ///
    /// * [`DbError::NothingStaged`] if no batch is staged
    /// * any underlying storage error, after which the previous contents
    ///   remain in place
    fn commit(&mut self) -> Result<u64, DbError>;

    /// Drops the staged batch, if any. The visible contents are untouched.
    fn discard(&mut self);

    /// Stages `metrics` and commits them.
    ///
    /// # Errors
    ///
    /// Returns the [`Self::prepare`] or [`Self::commit`] error; the
    /// previous contents remain in place.
    fn replace_all(&mut self, metrics: &[SafetyMetric]) -> Result<u64, DbError> {
        if let Err(e) = self.prepare(metrics) {
            self.discard();
            return Err(e);
        }
        self.commit()
    }

    /// Reads every stored metric.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    fn load(&self) -> Result<Vec<SafetyMetric>, DbError>;

    /// Number of stored metrics.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    fn count(&self) -> Result<u64, DbError> {
        Ok(self.load()?.len() as u64)
    }
}
