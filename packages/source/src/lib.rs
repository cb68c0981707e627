#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime record sources and the ingestion normalizer.
//!
//! Each data provider implements the [`CrimeSource`] trait to fetch raw
//! records and describe their field layout. [`normalize::normalize_records`]
//! then validates those records into
//! [`CrimeRecord`](safety_map_source_models::CrimeRecord)s for scoring.

pub mod file;
pub mod normalize;
pub mod parsing;
pub mod progress;
pub mod retry;
pub mod socrata;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safety_map_source_models::{FieldMapping, RawRecord};

use crate::progress::ProgressCallback;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status we do not retry or ran out of
    /// retries.
    #[error("HTTP status {status}: {message}")]
    Status {
        /// Final status code.
        status: reqwest::StatusCode,
        /// What was being attempted.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload parsed but did not have the expected shape.
    #[error("Unexpected response shape: {message}")]
    Shape {
        /// Description of what went wrong.
        message: String,
    },
}

/// Options controlling how much data a fetch returns.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Only fetch records that occurred on or after this timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of records to fetch.
    pub limit: Option<u64>,
}

/// Trait that all crime data sources implement.
#[async_trait]
pub trait CrimeSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"la_pd"`).
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Returns the field layout of the records this source yields.
    fn field_mapping(&self) -> FieldMapping;

    /// Fetches every raw record the options allow.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the records cannot be retrieved.
    async fn fetch(
        &self,
        options: &FetchOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Returns the built-in network sources.
#[must_use]
pub fn builtin_sources() -> Vec<Box<dyn CrimeSource>> {
    vec![Box::new(socrata::SocrataSource::lapd())]
}

/// Splits a parsed JSON document into raw records.
///
/// Non-object array entries are skipped with a warning.
///
/// # Errors
///
/// Returns [`SourceError::Shape`] if the document is not a JSON array.
pub fn records_from_value(value: serde_json::Value) -> Result<Vec<RawRecord>, SourceError> {
    let serde_json::Value::Array(items) = value else {
        return Err(SourceError::Shape {
            message: "expected a JSON array of records".to_string(),
        });
    };

    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    if records.len() < total {
        log::warn!(
            "Skipped {} non-object entries out of {total}",
            total - records.len()
        );
    }

    Ok(records)
}
