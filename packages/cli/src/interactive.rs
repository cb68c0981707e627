#![allow(clippy::module_name_repetitions)]

//! Menu-driven front end for running the pipeline without memorizing
//! flags.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use safety_map_cli_utils::MultiProgress;
use safety_map_source_models::MappingPreset;

use crate::pipeline::{self, DEFAULT_INTERVAL_DAYS, RunOptions};

/// Top-level actions in the interactive menu.
enum Action {
    RunNow,
    Schedule,
    StoreStatus,
    ListMetrics,
    ListSources,
}

impl Action {
    const ALL: &[Self] = &[
        Self::RunNow,
        Self::Schedule,
        Self::StoreStatus,
        Self::ListMetrics,
        Self::ListSources,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunNow => "Compute safety scores now",
            Self::Schedule => "Run on a schedule",
            Self::StoreStatus => "Show stored scores",
            Self::ListMetrics => "List safety metrics",
            Self::ListSources => "List data sources",
        }
    }
}

/// Prompts for an action and runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected action fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::RunNow => {
            let options = prompt_run_options()?;
            let summary = pipeline::run_once(&options, multi).await?;
            pipeline::print_summary(&summary);
        }
        Action::Schedule => {
            let options = prompt_run_options()?;
            let interval_days =
                prompt_optional_u64(&format!("Days between runs (empty for {DEFAULT_INTERVAL_DAYS})"))?
                    .unwrap_or(DEFAULT_INTERVAL_DAYS);
            pipeline::schedule(&options, interval_days, multi).await;
        }
        Action::StoreStatus => pipeline::print_store_status(None)?,
        Action::ListMetrics => pipeline::print_metrics(),
        Action::ListSources => pipeline::print_sources(),
    }

    Ok(())
}

fn prompt_run_options() -> Result<RunOptions, Box<dyn std::error::Error>> {
    let mut options = RunOptions::default();

    let from_file = Select::new()
        .with_prompt("Where should records come from?")
        .items(&["LAPD open data portal", "Local JSON file"])
        .default(0)
        .interact()?
        == 1;

    if from_file {
        let path: String = Input::new().with_prompt("JSON file path").interact_text()?;
        options.input = Some(PathBuf::from(path.trim()));

        let presets = [MappingPreset::Canonical, MappingPreset::Lapd];
        let labels: Vec<&str> = presets.iter().map(|p| p.as_ref()).collect();
        let idx = Select::new()
            .with_prompt("Field layout")
            .items(&labels)
            .default(1)
            .interact()?;
        options.mapping = presets[idx];
    } else {
        let since_days = prompt_optional_u64(&format!(
            "Days of history to fetch (empty for {})",
            pipeline::DEFAULT_SINCE_DAYS
        ))?
        .map(u32::try_from)
        .transpose()?;
        options.since_days = Some(since_days.unwrap_or(pipeline::DEFAULT_SINCE_DAYS));
    }

    options.limit = prompt_optional_u64("Record limit (empty for no limit)")?;
    options.dry_run = Confirm::new()
        .with_prompt("Dry run (score without storing)?")
        .default(false)
        .interact()?;

    Ok(options)
}

fn prompt_optional_u64(prompt: &str) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    if input.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(input.trim().parse()?))
    }
}
