#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for stored metrics.
//!
//! Defaults live under the project root's `data/` directory. The
//! `SAFETY_MAP_DB_PATH` environment variable overrides the `DuckDB` path.

use std::path::{Path, PathBuf};

/// Environment variable overriding [`metrics_db_path`].
pub const DB_PATH_ENV: &str = "SAFETY_MAP_DB_PATH";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the default `DuckDB` path, ignoring the environment.
#[must_use]
pub fn default_metrics_db_path() -> PathBuf {
    data_dir().join("safety_metrics.duckdb")
}

/// Returns the `DuckDB` path: `$SAFETY_MAP_DB_PATH` when set and
/// non-empty, otherwise [`default_metrics_db_path`].
#[must_use]
pub fn metrics_db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map_or_else(default_metrics_db_path, PathBuf::from)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
