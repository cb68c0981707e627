#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the safety map binaries.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so log
//! lines never tear a progress bar. [`IndicatifProgress`] renders the
//! fetch and scoring steps behind the [`ProgressCallback`] trait.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use safety_map_source::progress::ProgressCallback;

pub use indicatif::MultiProgress;

const TICK: Duration = Duration::from_millis(100);

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied once `set_total()` reports a length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    fn spinner(multi: &MultiProgress, message: &str, color: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(TICK);
        bar.set_style(
            ProgressStyle::with_template(&format!("{{spinner:.{color}}} {{msg}}"))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(&format!(
            "  {{msg}} {{wide_bar:.{color}/dim}} {{pos}}/{{len}} {{percent}}% [{{eta}}]"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }

    /// Spinner for a source fetch. Becomes a bar once the source knows how
    /// many records it will return.
    #[must_use]
    pub fn fetch_bar(multi: &MultiProgress, source_name: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::spinner(
            multi,
            &format!("Fetching {source_name}"),
            "cyan",
        ))
    }

    /// Bar over grid cells while scoring.
    #[must_use]
    pub fn scoring_bar(multi: &MultiProgress) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::spinner(multi, "Scoring", "yellow"))
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// Defaults to `info` for this workspace's crates; `RUST_LOG` overrides.
/// Returns the [`MultiProgress`] every progress bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Warn)
        .filter_module("safety_map", LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when called twice (tests, schedule re-entry).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
