//! One scoring run end to end (fetch, score, store), and the recurring
//! scheduler that repeats it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use safety_map_cli_utils::{IndicatifProgress, MultiProgress};
use safety_map_database::json_file::JsonFileMetricStore;
use safety_map_database::metrics_db::DuckDbMetricStore;
use safety_map_database::{DbError, MetricStore};
use safety_map_metrics_models::registry::all_metrics;
use safety_map_metrics_models::{MetricType, RiskLevel, SafetyMetric, TimeFilter};
use safety_map_scoring::config::{DEFAULT_RESOLUTION, ScoringConfig};
use safety_map_scoring::{ScoringError, score_records};
use safety_map_source::file::JsonFileSource;
use safety_map_source::progress::ProgressCallback;
use safety_map_source::socrata::SocrataSource;
use safety_map_source::{CrimeSource, FetchOptions, SourceError};
use safety_map_source_models::MappingPreset;

/// How far back network sources fetch by default.
pub const DEFAULT_SINCE_DAYS: u32 = 365;

/// Days between scheduled runs.
pub const DEFAULT_INTERVAL_DAYS: u64 = 30;

/// Environment variable overriding the Socrata endpoint.
pub const SOURCE_URL_ENV: &str = "SAFETY_MAP_SOURCE_URL";

const SECONDS_PER_DAY: u64 = 86_400;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Fetching records failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Scoring produced nothing usable.
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Writing or reading stored metrics failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The lookback reaches past the earliest representable date.
    #[error("Lookback of {days} days from {now} is out of range")]
    LookbackOutOfRange {
        /// Requested lookback.
        days: u32,
        /// Reference time it was subtracted from.
        now: DateTime<Utc>,
    },
}

/// Everything a single run needs to know.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Read records from this JSON file instead of the network.
    pub input: Option<PathBuf>,
    /// Field layout of `input`. Ignored for network sources.
    pub mapping: MappingPreset,
    /// Maximum number of records to fetch.
    pub limit: Option<u64>,
    /// Only fetch records from the last N days (network sources).
    pub since_days: Option<u32>,
    /// `DuckDB` path; defaults to `$SAFETY_MAP_DB_PATH` or `data/`.
    pub db_path: Option<PathBuf>,
    /// Also write the metrics to this JSON file.
    pub json_path: Option<PathBuf>,
    /// Reference time; defaults to the wall clock at run start.
    pub now: Option<DateTime<Utc>>,
    /// Grid cell size in degrees.
    pub resolution: f64,
    /// Score without writing anything.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            input: None,
            mapping: MappingPreset::Canonical,
            limit: None,
            since_days: Some(DEFAULT_SINCE_DAYS),
            db_path: None,
            json_path: None,
            now: None,
            resolution: DEFAULT_RESOLUTION,
            dry_run: false,
        }
    }
}

impl RunOptions {
    /// Fetch options relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LookbackOutOfRange`] if `now` minus
    /// `since_days` is not a representable date.
    pub fn fetch_options(&self, now: DateTime<Utc>) -> Result<FetchOptions, PipelineError> {
        let since = self
            .since_days
            .map(|days| {
                TimeDelta::try_days(i64::from(days))
                    .and_then(|lookback| now.checked_sub_signed(lookback))
                    .ok_or(PipelineError::LookbackOutOfRange { days, now })
            })
            .transpose()?;

        Ok(FetchOptions {
            since,
            limit: self.limit,
        })
    }

    /// Scoring parameters for this run.
    #[must_use]
    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            resolution: self.resolution,
            ..ScoringConfig::default()
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Source the records came from.
    pub source_id: String,
    /// Raw records fetched.
    pub fetched: usize,
    /// Records that survived validation.
    pub valid: usize,
    /// Records dropped during validation.
    pub discarded: u64,
    /// Non-empty grid cells.
    pub cells: usize,
    /// Emitted metrics per dimension.
    pub counts: BTreeMap<MetricType, usize>,
    /// Emitted metrics per risk level.
    pub risk_levels: BTreeMap<RiskLevel, usize>,
    /// Metrics written to each store, by location.
    pub stored: Vec<(String, u64)>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Total emitted metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Picks the data source for a run: the input file when given, otherwise
/// the LAPD Socrata dataset (endpoint overridable via
/// [`SOURCE_URL_ENV`]).
#[must_use]
pub fn build_source(options: &RunOptions) -> Box<dyn CrimeSource> {
    if let Some(path) = &options.input {
        return Box::new(JsonFileSource::new(path, options.mapping.into()));
    }

    let mut source = SocrataSource::lapd();
    if let Ok(url) = std::env::var(SOURCE_URL_ENV)
        && !url.trim().is_empty()
    {
        log::info!("Using source URL from {SOURCE_URL_ENV}: {url}");
        source = source.with_api_url(url.trim());
    }
    Box::new(source)
}

/// Opens every store the options ask for. A dry run opens none.
///
/// Stores are committed in the returned order, so the `DuckDB` store comes
/// last.
///
/// # Errors
///
/// Returns [`DbError`] if the `DuckDB` file cannot be opened.
pub fn open_stores(options: &RunOptions) -> Result<Vec<Box<dyn MetricStore>>, DbError> {
    if options.dry_run {
        return Ok(Vec::new());
    }

    let mut stores: Vec<Box<dyn MetricStore>> = Vec::new();
    if let Some(path) = &options.json_path {
        stores.push(Box::new(JsonFileMetricStore::new(path)));
    }

    let db = match &options.db_path {
        Some(path) => DuckDbMetricStore::open(path)?,
        None => DuckDbMetricStore::open_default()?,
    };
    stores.push(Box::new(db));

    Ok(stores)
}

/// Stages `metrics` in every store, then commits them in order. If any
/// store fails to stage, every staged batch is discarded and no store is
/// changed.
///
/// # Errors
///
/// Returns the first [`DbError`] from staging or committing.
pub fn replace_in_all(
    stores: &mut [Box<dyn MetricStore>],
    metrics: &[SafetyMetric],
) -> Result<Vec<(String, u64)>, DbError> {
    let staged = stores
        .iter_mut()
        .try_for_each(|store| store.prepare(metrics).map(|_| ()));
    if let Err(e) = staged {
        log::error!("Staging metrics failed, nothing stored: {e}");
        stores.iter_mut().for_each(|store| store.discard());
        return Err(e);
    }

    let mut stored = Vec::with_capacity(stores.len());
    let mut failure = None;
    for store in stores.iter_mut() {
        match store.commit() {
            Ok(count) => stored.push((store.location(), count)),
            Err(e) => {
                log::error!("Committing metrics to {} failed: {e}", store.location());
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        stores.iter_mut().for_each(|store| store.discard());
        return Err(e);
    }

    Ok(stored)
}

/// Fetches from `source`, scores, and replaces the contents of every store.
///
/// Nothing is written unless scoring succeeds and every store stages the
/// batch.
///
/// # Errors
///
/// Returns [`PipelineError`] if fetching, scoring, or storing fails.
pub async fn run_pipeline(
    source: &dyn CrimeSource,
    stores: &mut [Box<dyn MetricStore>],
    options: &RunOptions,
    now: DateTime<Utc>,
    fetch_progress: Arc<dyn ProgressCallback>,
    score_progress: &dyn ProgressCallback,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    log::info!(
        "Starting run at {now} from {} ({})",
        source.name(),
        source.id()
    );

    let records = source
        .fetch(&options.fetch_options(now)?, fetch_progress)
        .await?;
    log::info!("Fetched {} raw records", records.len());

    let run = score_records(
        &records,
        &source.field_mapping(),
        &all_metrics(),
        &options.scoring_config(),
        now,
        score_progress,
    )?;

    let mut risk_levels = BTreeMap::new();
    for metric in &run.metrics {
        *risk_levels.entry(metric.risk_level).or_insert(0) += 1;
    }

    let stored = replace_in_all(stores, &run.metrics)?;
    if stores.is_empty() {
        log::info!("Dry run: {} metrics not stored", run.metrics.len());
    }

    Ok(RunSummary {
        source_id: source.id().to_string(),
        fetched: records.len(),
        valid: run.valid_records,
        discarded: run.discards.total(),
        cells: run.cells_with_data,
        counts: run.counts_by_type(),
        risk_levels,
        stored,
        elapsed: start.elapsed(),
    })
}

/// One full run with terminal progress bars.
///
/// # Errors
///
/// Returns [`PipelineError`] if opening stores, fetching, scoring, or
/// storing fails.
pub async fn run_once(
    options: &RunOptions,
    multi: &MultiProgress,
) -> Result<RunSummary, PipelineError> {
    let now = options.now.unwrap_or_else(Utc::now);
    let source = build_source(options);
    let mut stores = open_stores(options)?;

    let fetch_progress = IndicatifProgress::fetch_bar(multi, source.name());
    let score_progress = IndicatifProgress::scoring_bar(multi);

    run_pipeline(
        source.as_ref(),
        &mut stores,
        options,
        now,
        fetch_progress,
        score_progress.as_ref(),
    )
    .await
}

/// Runs immediately, then every `interval_days` days until Ctrl-C.
///
/// A failed run is logged and the schedule continues. Each run uses the
/// wall clock as its reference time.
pub async fn schedule(options: &RunOptions, interval_days: u64, multi: &MultiProgress) {
    let interval_days = interval_days.max(1);
    let mut interval =
        tokio::time::interval(Duration::from_secs(interval_days * SECONDS_PER_DAY));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let options = RunOptions {
        now: None,
        ..options.clone()
    };

    log::info!("Scheduler started: running every {interval_days} days");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Scheduler stopped");
                return;
            }
        }

        match run_once(&options, multi).await {
            Ok(summary) => print_summary(&summary),
            Err(e) => log::error!("Scheduled run failed: {e}"),
        }
        log::info!("Next run in {interval_days} days");
    }
}

/// Prints a run summary table.
pub fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "Source {}: {} fetched, {} valid, {} dropped, {} cells, {:.1}s",
        summary.source_id,
        summary.fetched,
        summary.valid,
        summary.discarded,
        summary.cells,
        summary.elapsed.as_secs_f64()
    );
    println!("{:<10} {:>8}", "METRIC", "CELLS");
    println!("{}", "-".repeat(19));
    for (metric_type, count) in &summary.counts {
        println!("{:<10} {count:>8}", metric_type.as_ref());
    }
    println!("{:<10} {:>8}", "total", summary.metric_count());
    println!();
    for (level, count) in &summary.risk_levels {
        println!("{:<14} {count:>8}", level.as_ref());
    }
    for (location, count) in &summary.stored {
        println!("Stored {count} metrics in {location}");
    }
}

/// Prints what the `DuckDB` store currently holds.
///
/// # Errors
///
/// Returns [`DbError`] if the store cannot be opened or read.
pub fn print_store_status(db_path: Option<&Path>) -> Result<(), DbError> {
    let store = match db_path {
        Some(path) => DuckDbMetricStore::open(path)?,
        None => DuckDbMetricStore::open_default()?,
    };

    println!("Store: {}", store.location());
    let Some(computed_at) = store.last_computed_at()? else {
        println!("No metrics stored yet.");
        return Ok(());
    };

    let metrics = store.load()?;
    let mut counts: BTreeMap<MetricType, usize> = BTreeMap::new();
    for metric in &metrics {
        *counts.entry(metric.metric_type).or_insert(0) += 1;
    }
    let expires_at = metrics.iter().map(|m| m.expires_at).min();

    println!("Computed at: {computed_at}");
    if let Some(expires_at) = expires_at {
        let state = if expires_at <= Utc::now() {
            "expired"
        } else {
            "fresh"
        };
        println!("Expires at:  {expires_at} ({state})");
    }
    println!("{:<10} {:>8}", "METRIC", "CELLS");
    println!("{}", "-".repeat(19));
    for (metric_type, count) in &counts {
        println!("{:<10} {count:>8}", metric_type.as_ref());
    }
    println!("{:<10} {:>8}", "total", metrics.len());

    Ok(())
}

/// Prints the metric definitions table.
pub fn print_metrics() {
    println!("{:<10} {:<38} {:>6} FILTER", "METRIC", "QUESTION", "CODES");
    println!("{}", "-".repeat(70));
    for definition in all_metrics() {
        let filter = match definition.time_filter {
            Some(TimeFilter::HourRange { start, end }) => format!("{start:02}:00-{end:02}:00"),
            None => String::new(),
        };
        println!(
            "{:<10} {:<38} {:>6} {filter}",
            definition.metric_type.as_ref(),
            definition.question,
            definition.category_codes.len(),
        );
    }
}

/// Prints the built-in network sources.
pub fn print_sources() {
    println!("{:<20} NAME", "ID");
    println!("{}", "-".repeat(50));
    for source in safety_map_source::builtin_sources() {
        println!("{:<20} {}", source.id(), source.name());
    }
    println!("{:<20} Local JSON file (--input FILE)", "file");
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use safety_map_source::progress::{NullProgress, null_progress};
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap()
    }

    fn fixture_path(name: &str, records: &serde_json::Value) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("safety_map_cli_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(records).unwrap()).unwrap();
        path
    }

    fn lapd_records() -> serde_json::Value {
        json!([
            {"date_occ": "2025-03-01T00:00:00.000", "time_occ": "2230", "lat": "34.0512", "lon": "-118.2437", "crm_cd": "330"},
            {"date_occ": "2025-02-11T00:00:00.000", "time_occ": "0915", "lat": "34.0515", "lon": "-118.2431", "crm_cd": "331"},
            {"date_occ": "2025-01-20T00:00:00.000", "time_occ": "2300", "lat": "34.0612", "lon": "-118.2437", "crm_cd": "210"},
            {"date_occ": "2024-12-01T00:00:00.000", "time_occ": "1400", "lat": "34.1500", "lon": "-118.3500", "crm_cd": "624"},
            {"date_occ": "2024-11-15T00:00:00.000", "time_occ": "0100", "lat": "34.1500", "lon": "-118.3500", "crm_cd": "626"},
            {"date_occ": "2025-03-09T00:00:00.000", "time_occ": "1200", "lat": "34.0512", "lon": "-118.2437", "crm_cd": "330"},
            {"date_occ": "2025-03-01T00:00:00.000", "time_occ": "1200", "lat": "0", "lon": "0", "crm_cd": "330"}
        ])
    }

    fn file_options(path: PathBuf) -> RunOptions {
        RunOptions {
            input: Some(path),
            mapping: MappingPreset::Lapd,
            now: Some(now()),
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn file_run_replaces_store_contents() {
        let path = fixture_path("lapd.json", &lapd_records());
        let options = file_options(path);
        let source = build_source(&options);
        let mut stores: Vec<Box<dyn MetricStore>> =
            vec![Box::new(DuckDbMetricStore::open_in_memory().unwrap())];

        let summary = run_pipeline(
            source.as_ref(),
            &mut stores,
            &options,
            now(),
            null_progress(),
            &NullProgress,
        )
        .await
        .unwrap();

        assert_eq!(summary.fetched, 7);
        assert_eq!(summary.valid, 5);
        assert_eq!(summary.discarded, 2);
        assert_eq!(summary.cells, 3);
        assert_eq!(summary.counts.get(&MetricType::Vehicle), Some(&1));
        assert_eq!(summary.counts.get(&MetricType::Night), Some(&1));
        assert_eq!(summary.counts.get(&MetricType::Women), Some(&1));
        assert_eq!(summary.counts.get(&MetricType::Child), None);

        let stored = stores[0].load().unwrap();
        assert_eq!(stored.len(), summary.metric_count());
        assert_eq!(summary.stored[0].1, summary.metric_count() as u64);
        assert!(stored.iter().all(|m| m.computed_at == now()));
    }

    #[tokio::test]
    async fn failed_scoring_leaves_store_untouched() {
        let good = fixture_path("good.json", &lapd_records());
        let options = file_options(good);
        let source = build_source(&options);
        let mut stores: Vec<Box<dyn MetricStore>> =
            vec![Box::new(DuckDbMetricStore::open_in_memory().unwrap())];
        run_pipeline(
            source.as_ref(),
            &mut stores,
            &options,
            now(),
            null_progress(),
            &NullProgress,
        )
        .await
        .unwrap();
        let before = stores[0].count().unwrap();

        let bad = fixture_path(
            "bad.json",
            &json!([{"date_occ": "not a date", "lat": "34.05", "lon": "-118.25", "crm_cd": "330"}]),
        );
        let options = file_options(bad);
        let source = build_source(&options);
        let result = run_pipeline(
            source.as_ref(),
            &mut stores,
            &options,
            now(),
            null_progress(),
            &NullProgress,
        )
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::Scoring(ScoringError::NoValidRecords { .. }))
        ));
        assert_eq!(stores[0].count().unwrap(), before);
    }

    #[tokio::test]
    async fn json_staging_failure_leaves_duckdb_untouched() {
        let options = file_options(fixture_path("staged.json", &lapd_records()));
        let source = build_source(&options);
        let mut stores: Vec<Box<dyn MetricStore>> =
            vec![Box::new(DuckDbMetricStore::open_in_memory().unwrap())];
        run_pipeline(
            source.as_ref(),
            &mut stores,
            &options,
            now(),
            null_progress(),
            &NullProgress,
        )
        .await
        .unwrap();
        let before = stores[0].load().unwrap();

        let blocker = fixture_path("not_a_dir", &json!([]));
        let db = stores.pop().unwrap();
        let mut stores: Vec<Box<dyn MetricStore>> = vec![
            Box::new(JsonFileMetricStore::new(blocker.join("out.json"))),
            db,
        ];
        let later = now() + chrono::Duration::days(30);
        let result = run_pipeline(
            source.as_ref(),
            &mut stores,
            &options,
            later,
            null_progress(),
            &NullProgress,
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Db(DbError::Io(_)))));
        assert_eq!(stores[1].load().unwrap(), before);
        assert!(matches!(stores[1].commit(), Err(DbError::NothingStaged)));
    }

    #[test]
    fn json_store_commits_before_duckdb() {
        let options = RunOptions {
            db_path: Some(
                std::env::temp_dir()
                    .join(format!("safety_map_cli_{}", std::process::id()))
                    .join("order.duckdb"),
            ),
            json_path: Some(PathBuf::from("out.json")),
            ..RunOptions::default()
        };
        let stores = open_stores(&options).unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].location(), "out.json");
        assert!(stores[1].location().ends_with("order.duckdb"));
    }

    #[tokio::test]
    async fn empty_file_is_no_records() {
        let path = fixture_path("empty.json", &json!([]));
        let options = file_options(path);
        let source = build_source(&options);
        let result = run_pipeline(
            source.as_ref(),
            &mut [],
            &options,
            now(),
            null_progress(),
            &NullProgress,
        )
        .await;
        assert!(matches!(
            result,
            Err(PipelineError::Scoring(ScoringError::NoRecords))
        ));
    }

    #[test]
    fn fetch_options_look_back_from_now() {
        let options = RunOptions {
            limit: Some(10),
            ..RunOptions::default()
        };
        let fetch = options.fetch_options(now()).unwrap();
        assert_eq!(fetch.since, Some(now() - chrono::Duration::days(365)));
        assert_eq!(fetch.limit, Some(10));
    }

    #[test]
    fn huge_lookback_is_an_error_not_a_panic() {
        let options = RunOptions {
            since_days: Some(u32::MAX),
            ..RunOptions::default()
        };
        assert!(matches!(
            options.fetch_options(now()),
            Err(PipelineError::LookbackOutOfRange { days: u32::MAX, .. })
        ));

        let unbounded = RunOptions {
            since_days: None,
            ..RunOptions::default()
        };
        assert_eq!(unbounded.fetch_options(now()).unwrap().since, None);
    }

    #[test]
    fn dry_run_opens_no_stores() {
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        assert!(open_stores(&options).unwrap().is_empty());
    }
}
