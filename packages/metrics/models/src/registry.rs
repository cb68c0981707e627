//! Metric registry: loads the safety dimension table from embedded TOML.
//!
//! `metrics.toml` is baked into the binary at compile time via
//! [`include_str!`]. Every definition is validated on load so a bad table
//! is caught by the tests below rather than producing silent mis-scoring.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::{MetricDefinition, MetricType, TimeFilter};

/// The metric table embedded at compile time.
const METRICS_TOML: &str = include_str!("../metrics.toml");

/// Errors that can occur while loading a metric table.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The TOML could not be parsed into definitions.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A definition parsed but is not usable.
    #[error("Invalid metric {metric_type}: {message}")]
    Invalid {
        /// Metric the problem was found in.
        metric_type: MetricType,
        /// Description of what is wrong.
        message: String,
    },

    /// The same metric type appears twice.
    #[error("Duplicate metric definition: {0}")]
    Duplicate(MetricType),
}

#[derive(Debug, Deserialize)]
struct MetricTable {
    metric: Vec<MetricDefinition>,
}

/// Parses and validates a metric table.
///
/// # Errors
///
/// Returns [`RegistryError`] if the TOML is malformed, a metric type is
/// repeated, a metric has no category codes, or a time filter uses an
/// hour outside 0-23 or an empty range.
pub fn parse_metrics_toml(toml_str: &str) -> Result<Vec<MetricDefinition>, RegistryError> {
    let table: MetricTable = toml::from_str(toml_str)?;
    let mut seen = BTreeSet::new();

    for definition in &table.metric {
        if !seen.insert(definition.metric_type) {
            return Err(RegistryError::Duplicate(definition.metric_type));
        }
        validate(definition)?;
    }

    Ok(table.metric)
}

fn validate(definition: &MetricDefinition) -> Result<(), RegistryError> {
    let invalid = |message: &str| RegistryError::Invalid {
        metric_type: definition.metric_type,
        message: message.to_string(),
    };

    if definition.category_codes.is_empty() {
        return Err(invalid("no category codes"));
    }
    if definition.category_codes.iter().any(|c| c.trim().is_empty()) {
        return Err(invalid("blank category code"));
    }
    if let Some(TimeFilter::HourRange { start, end }) = definition.time_filter {
        if start > 23 || end > 23 {
            return Err(invalid("hour range outside 0-23"));
        }
        if start == end {
            return Err(invalid("empty hour range"));
        }
    }

    Ok(())
}

/// Returns the built-in metric definitions, in table order.
///
/// # Panics
///
/// Panics if the embedded `metrics.toml` is malformed (a compile-time
/// guarantee in practice, enforced by the tests below).
#[must_use]
pub fn all_metrics() -> Vec<MetricDefinition> {
    let metrics = parse_metrics_toml(METRICS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse metrics.toml: {e}"));
    log::debug!("Loaded {} metric definitions", metrics.len());
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_metrics() {
        let metrics = all_metrics();
        let types: Vec<MetricType> = metrics.iter().map(|m| m.metric_type).collect();
        assert_eq!(types, MetricType::all());
    }

    #[test]
    fn all_metrics_have_required_fields() {
        for metric in &all_metrics() {
            assert!(!metric.question.is_empty(), "{}: no question", metric.metric_type);
            assert!(
                !metric.description.is_empty(),
                "{}: no description",
                metric.metric_type
            );
        }
    }

    #[test]
    fn only_night_has_time_filter() {
        for metric in &all_metrics() {
            assert_eq!(
                metric.time_filter.is_some(),
                metric.metric_type == MetricType::Night,
                "{}",
                metric.metric_type
            );
        }
    }

    #[test]
    fn rejects_duplicate_metric() {
        let toml_str = r#"
            [[metric]]
            metric_type = "child"
            question = "q"
            description = "d"
            category_codes = ["627"]

            [[metric]]
            metric_type = "child"
            question = "q"
            description = "d"
            category_codes = ["235"]
        "#;
        assert!(matches!(
            parse_metrics_toml(toml_str),
            Err(RegistryError::Duplicate(MetricType::Child))
        ));
    }

    #[test]
    fn rejects_out_of_range_hour() {
        let toml_str = r#"
            [[metric]]
            metric_type = "night"
            question = "q"
            description = "d"
            category_codes = ["210"]
            time_filter = { type = "hour_range", start = 18, end = 24 }
        "#;
        assert!(matches!(
            parse_metrics_toml(toml_str),
            Err(RegistryError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_empty_codes() {
        let toml_str = r#"
            [[metric]]
            metric_type = "vehicle"
            question = "q"
            description = "d"
            category_codes = []
        "#;
        assert!(matches!(
            parse_metrics_toml(toml_str),
            Err(RegistryError::Invalid { .. })
        ));
    }
}
