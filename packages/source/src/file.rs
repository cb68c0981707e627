//! Local JSON file source.
//!
//! Reads a previously downloaded JSON array of records. Used for offline
//! runs and for replaying a fixed snapshot.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use safety_map_source_models::{FieldMapping, RawRecord};

use crate::progress::ProgressCallback;
use crate::{CrimeSource, FetchOptions, SourceError, records_from_value};

/// A JSON array of records on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    id: String,
    path: PathBuf,
    mapping: FieldMapping,
}

impl JsonFileSource {
    /// Creates a file source with the given field layout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mapping: FieldMapping) -> Self {
        let path = path.into();
        let id = path
            .file_stem()
            .map_or_else(|| "file".to_string(), |s| s.to_string_lossy().into_owned());
        Self { id, path, mapping }
    }
}

#[async_trait]
impl CrimeSource for JsonFileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Local JSON file"
    }

    fn field_mapping(&self) -> FieldMapping {
        self.mapping.clone()
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        log::info!("Reading records from {}", self.path.display());
        let data = tokio::fs::read_to_string(&self.path).await?;
        let mut records = records_from_value(serde_json::from_str(&data)?)?;

        if let Some(limit) = options.limit {
            records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        progress.finish(format!("{}: {} records", self.id, records.len()));
        Ok(records)
    }
}
