//! JSON file metric storage.
//!
//! Preparing writes the whole batch to a sibling temp file; committing
//! renames it over the target, so readers see either the previous run or
//! the new one.

use std::path::{Path, PathBuf};

use safety_map_metrics_models::SafetyMetric;

use crate::{DbError, MetricStore};

/// Metrics persisted as a pretty-printed JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileMetricStore {
    path: PathBuf,
    staged: Option<u64>,
}

impl JsonFileMetricStore {
    /// Creates a store writing to `path`. Nothing is touched until the
    /// first [`MetricStore::prepare`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: None,
        }
    }

    /// Target file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl MetricStore for JsonFileMetricStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn prepare(&mut self, metrics: &[SafetyMetric]) -> Result<u64, DbError> {
        self.discard();
        if metrics.is_empty() {
            return Err(DbError::EmptyBatch);
        }
        if let Some(parent) = self.path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let temp = self.temp_path();
        if let Err(e) = std::fs::write(&temp, serde_json::to_vec_pretty(metrics)?) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        let count = metrics.len() as u64;
        self.staged = Some(count);
        log::debug!("Staged {count} metrics in {}", temp.display());
        Ok(count)
    }

    fn commit(&mut self) -> Result<u64, DbError> {
        let count = self.staged.take().ok_or(DbError::NothingStaged)?;

        let temp = self.temp_path();
        if let Err(e) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        log::info!("Wrote {count} metrics to {}", self.path.display());
        Ok(count)
    }

    fn discard(&mut self) {
        if self.staged.take().is_some() {
            let _ = std::fs::remove_file(self.temp_path());
        }
    }

    fn load(&self) -> Result<Vec<SafetyMetric>, DbError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
