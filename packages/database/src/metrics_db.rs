//! `DuckDB` metric storage.
//!
//! One `safety_metrics` table holding the latest run, and a `_meta` table
//! recording when that run happened. A new batch is first inserted into
//! `safety_metrics_staging`; committing swaps it into `safety_metrics`
//! inside a single transaction, so a failed insert or swap leaves the
//! previous run in place.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{Connection, Transaction};
use safety_map_metrics_models::SafetyMetric;

use crate::{DbError, MetricStore};

/// Number of rows per INSERT statement.
const CHUNK_SIZE: usize = 500;

/// Bound parameters per row.
const COLUMNS: usize = 14;

const METRICS_TABLE: &str = "safety_metrics";
const STAGING_TABLE: &str = "safety_metrics_staging";

/// A batch sitting in the staging table.
#[derive(Debug, Clone, Copy)]
struct Staged {
    count: u64,
    computed_at: Option<DateTime<Utc>>,
}

/// Metrics persisted in a `DuckDB` database.
pub struct DuckDbMetricStore {
    conn: Connection,
    location: String,
    staged: Option<Staged>,
}

impl std::fmt::Debug for DuckDbMetricStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbMetricStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl DuckDbMetricStore {
    /// Opens (or creates) a metrics database and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        create_schema(&conn)?;

        Ok(Self {
            conn,
            location: path.display().to_string(),
            staged: None,
        })
    }

    /// Opens the database at [`crate::paths::metrics_db_path`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, DbError> {
        Self::open(&crate::paths::metrics_db_path())
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn,
            location: ":memory:".to_string(),
            staged: None,
        })
    }

    /// When the stored metrics were computed, if any run has been stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn last_computed_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        Ok(get_meta(&self.conn, "last_computed_at")?
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}

impl MetricStore for DuckDbMetricStore {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn prepare(&mut self, metrics: &[SafetyMetric]) -> Result<u64, DbError> {
        self.staged = None;
        if metrics.is_empty() {
            return Err(DbError::EmptyBatch);
        }

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {STAGING_TABLE}"), [])?;
        let count = insert_metrics(&tx, STAGING_TABLE, metrics)?;
        tx.commit()?;

        self.staged = Some(Staged {
            count,
            computed_at: metrics.iter().map(|m| m.computed_at).max(),
        });
        log::debug!("Staged {count} metrics in {}", self.location);
        Ok(count)
    }

    fn commit(&mut self) -> Result<u64, DbError> {
        let staged = self.staged.take().ok_or(DbError::NothingStaged)?;

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(&format!("DELETE FROM {METRICS_TABLE}"), [])?;
        log::info!("Deleted {deleted} existing metrics from {}", self.location);

        let inserted = tx.execute(
            &format!("INSERT INTO {METRICS_TABLE} SELECT * FROM {STAGING_TABLE}"),
            [],
        )?;
        let inserted = u64::try_from(inserted).unwrap_or(0);
        tx.execute(&format!("DELETE FROM {STAGING_TABLE}"), [])?;

        if let Some(computed_at) = staged.computed_at {
            set_meta(&tx, "last_computed_at", &computed_at.to_rfc3339())?;
        }
        set_meta(&tx, "metric_count", &inserted.to_string())?;
        tx.commit()?;

        if inserted != staged.count {
            log::warn!(
                "Staged {} metrics but stored {inserted} in {}",
                staged.count,
                self.location
            );
        }
        log::info!("Stored {inserted} metrics in {}", self.location);
        Ok(inserted)
    }

    fn discard(&mut self) {
        self.staged = None;
        if let Err(e) = self.conn.execute(&format!("DELETE FROM {STAGING_TABLE}"), []) {
            log::warn!("Failed to clear staged metrics in {}: {e}", self.location);
        }
    }

    fn load(&self) -> Result<Vec<SafetyMetric>, DbError> {
        load_metrics(&self.conn)
    }

    fn count(&self) -> Result<u64, DbError> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM safety_metrics")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    for table in [METRICS_TABLE, STAGING_TABLE] {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT NOT NULL PRIMARY KEY,
                latitude DOUBLE NOT NULL,
                longitude DOUBLE NOT NULL,
                metric_type TEXT NOT NULL,
                question TEXT NOT NULL,
                score SMALLINT NOT NULL,
                risk_level TEXT NOT NULL,
                trend TEXT NOT NULL,
                description TEXT NOT NULL,
                recent_count BIGINT NOT NULL,
                total_count BIGINT NOT NULL,
                relative_rate DOUBLE NOT NULL,
                computed_at TIMESTAMP NOT NULL,
                expires_at TIMESTAMP NOT NULL
            );"
        ))?;
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    Ok(())
}

/// Inserts metrics into `table` with multi-row INSERT statements.
fn insert_metrics(
    tx: &Transaction<'_>,
    table: &str,
    metrics: &[SafetyMetric],
) -> Result<u64, DbError> {
    let mut total_inserted = 0u64;

    for chunk in metrics.chunks(CHUNK_SIZE) {
        let mut sql = format!(
            "INSERT INTO {table} (
                id, latitude, longitude, metric_type, question, score,
                risk_level, trend, description, recent_count, total_count,
                relative_rate, computed_at, expires_at
            ) VALUES "
        );
        let row = format!("({})", vec!["?"; COLUMNS].join(", "));
        sql.push_str(&vec![row; chunk.len()].join(", "));

        let mut stmt = tx.prepare(&sql)?;
        let mut param_idx = 1usize;

        for metric in chunk {
            stmt.raw_bind_parameter(param_idx, &metric.id)?;
            stmt.raw_bind_parameter(param_idx + 1, metric.latitude)?;
            stmt.raw_bind_parameter(param_idx + 2, metric.longitude)?;
            stmt.raw_bind_parameter(param_idx + 3, metric.metric_type.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 4, &metric.question)?;
            stmt.raw_bind_parameter(param_idx + 5, i16::from(metric.score))?;
            stmt.raw_bind_parameter(param_idx + 6, metric.risk_level.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 7, metric.trend.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 8, &metric.description)?;
            stmt.raw_bind_parameter(param_idx + 9, to_i64(metric.recent_count))?;
            stmt.raw_bind_parameter(param_idx + 10, to_i64(metric.total_count))?;
            stmt.raw_bind_parameter(param_idx + 11, metric.relative_rate)?;
            stmt.raw_bind_parameter(param_idx + 12, format_timestamp(metric.computed_at))?;
            stmt.raw_bind_parameter(param_idx + 13, format_timestamp(metric.expires_at))?;

            param_idx += COLUMNS;
        }

        let rows = stmt.raw_execute()?;
        total_inserted += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total_inserted)
}

/// Raw column values as read back from `safety_metrics`.
struct StoredRow {
    id: String,
    latitude: f64,
    longitude: f64,
    metric_type: String,
    question: String,
    score: i16,
    risk_level: String,
    trend: String,
    description: String,
    recent_count: i64,
    total_count: i64,
    relative_rate: f64,
    computed_at: String,
    expires_at: String,
}

impl TryFrom<StoredRow> for SafetyMetric {
    type Error = DbError;

    fn try_from(row: StoredRow) -> Result<Self, Self::Error> {
        Ok(Self {
            metric_type: parse_enum(&row.metric_type, "metric_type")?,
            risk_level: parse_enum(&row.risk_level, "risk_level")?,
            trend: parse_enum(&row.trend, "trend")?,
            score: u8::try_from(row.score).map_err(|e| conversion("score", e))?,
            recent_count: u64::try_from(row.recent_count)
                .map_err(|e| conversion("recent_count", e))?,
            total_count: u64::try_from(row.total_count)
                .map_err(|e| conversion("total_count", e))?,
            computed_at: parse_timestamp(&row.computed_at)?,
            expires_at: parse_timestamp(&row.expires_at)?,
            id: row.id,
            latitude: row.latitude,
            longitude: row.longitude,
            question: row.question,
            description: row.description,
            relative_rate: row.relative_rate,
        })
    }
}

/// Reads every stored metric, ordered by location then metric.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be converted.
pub fn load_metrics(conn: &Connection) -> Result<Vec<SafetyMetric>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, latitude, longitude, metric_type, question, score,
                risk_level, trend, description, recent_count, total_count,
                relative_rate, computed_at::TEXT, expires_at::TEXT
         FROM safety_metrics
         ORDER BY latitude, longitude, metric_type",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(StoredRow {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            metric_type: row.get(3)?,
            question: row.get(4)?,
            score: row.get(5)?,
            risk_level: row.get(6)?,
            trend: row.get(7)?,
            description: row.get(8)?,
            recent_count: row.get(9)?,
            total_count: row.get(10)?,
            relative_rate: row.get(11)?,
            computed_at: row.get(12)?,
            expires_at: row.get(13)?,
        })
    })?;

    rows.map(|row| SafetyMetric::try_from(row?)).collect()
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parses `DuckDB`'s `TIMESTAMP::TEXT` output, with or without fractional
/// seconds, as UTC.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DbError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .map_err(|e| conversion("timestamp", e))
}

fn parse_enum<T: std::str::FromStr>(value: &str, column: &str) -> Result<T, DbError> {
    value.parse().map_err(|_| DbError::Conversion {
        message: format!("unknown {column} value {value:?}"),
    })
}

fn conversion(column: &str, error: impl std::fmt::Display) -> DbError {
    DbError::Conversion {
        message: format!("invalid {column}: {error}"),
    }
}
