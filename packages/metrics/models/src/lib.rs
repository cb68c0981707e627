#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety metric definitions and the scored output record.
//!
//! A [`MetricDefinition`] describes one safety dimension (night-time,
//! vehicle, ...) as plain data: the offense codes that count toward it and
//! an optional [`TimeFilter`]. The definitions are loaded from the embedded
//! `metrics.toml` by [`registry::all_metrics`]. [`SafetyMetric`] is the
//! per-cell, per-dimension record handed to the persistence layer.

pub mod registry;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A safety dimension scored for every grid cell.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricType {
    /// Pedestrian safety after dark.
    Night,
    /// Vehicle theft and break-ins.
    Vehicle,
    /// Crimes that could affect children.
    Child,
    /// Safety at and around transit locations.
    Transit,
    /// Harassment and crimes that disproportionately affect women.
    Women,
}

impl MetricType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Night,
            Self::Vehicle,
            Self::Child,
            Self::Transit,
            Self::Women,
        ]
    }
}

/// Restricts a metric to incidents that happened at certain times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeFilter {
    /// Hours in `start..end` (start inclusive, end exclusive). When
    /// `start > end` the range wraps past midnight, so `18..6` covers
    /// 18:00 through 05:59.
    HourRange {
        /// First matching hour (0-23).
        start: u8,
        /// First hour no longer matching (0-23).
        end: u8,
    },
}

impl TimeFilter {
    /// Returns whether an incident at `hour` (0-23) passes this filter.
    #[must_use]
    pub fn matches(self, hour: u32) -> bool {
        match self {
            Self::HourRange { start, end } => {
                let (start, end) = (u32::from(start), u32::from(end));
                if start <= end {
                    (start..end).contains(&hour)
                } else {
                    hour >= start || hour < end
                }
            }
        }
    }
}

/// Static description of one safety dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Which dimension this definition scores.
    pub metric_type: MetricType,
    /// Question shown to end users (e.g. "Can I park here safely?").
    pub question: String,
    /// One-line description appended to every emitted score.
    pub description: String,
    /// Offense codes that count toward this dimension.
    pub category_codes: BTreeSet<String>,
    /// Optional time-of-day restriction.
    #[serde(default)]
    pub time_filter: Option<TimeFilter>,
}

impl MetricDefinition {
    /// Returns whether an incident with this offense code and hour of day
    /// counts toward the metric.
    #[must_use]
    pub fn qualifies(&self, category_code: &str, hour_of_day: u32) -> bool {
        self.category_codes.contains(category_code)
            && self
                .time_filter
                .is_none_or(|filter| filter.matches(hour_of_day))
    }
}

/// Ordinal risk bucket for a cell relative to the city as a whole.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum RiskLevel {
    /// Much safer than the city average.
    #[serde(rename = "Low risk")]
    #[strum(serialize = "Low risk")]
    Low,
    /// Somewhat safer than the city average.
    #[serde(rename = "Medium risk")]
    #[strum(serialize = "Medium risk")]
    Medium,
    /// Around the city average.
    #[serde(rename = "High risk")]
    #[strum(serialize = "High risk")]
    High,
    /// Significantly more dangerous than the city average.
    #[serde(rename = "Maximum risk")]
    #[strum(serialize = "Maximum risk")]
    Maximum,
}

impl RiskLevel {
    /// Returns the safety score for this level. Higher is safer.
    #[must_use]
    pub const fn score(self) -> u8 {
        match self {
            Self::Low => 8,
            Self::Medium => 6,
            Self::High => 4,
            Self::Maximum => 2,
        }
    }
}

/// Direction of recent incident activity compared to the full history.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Trend {
    /// Recent rate is more than 20% above the historical rate.
    #[serde(rename = "up")]
    #[strum(serialize = "up")]
    Increasing,
    /// Recent rate is more than 20% below the historical rate.
    #[serde(rename = "down")]
    #[strum(serialize = "down")]
    Decreasing,
    /// Within 20% of the historical rate.
    #[serde(rename = "stable")]
    #[strum(serialize = "stable")]
    Stable,
}

impl Trend {
    /// Arrow used in human-readable descriptions.
    #[must_use]
    pub const fn arrow(self) -> &'static str {
        match self {
            Self::Increasing => "↑",
            Self::Decreasing => "↓",
            Self::Stable => "→",
        }
    }
}

/// One scored (grid cell, metric) pair as handed to the metric store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyMetric {
    /// Random identifier, regenerated every run.
    pub id: String,
    /// Latitude of the grid cell center.
    pub latitude: f64,
    /// Longitude of the grid cell center.
    pub longitude: f64,
    /// Dimension this score belongs to.
    pub metric_type: MetricType,
    /// User-facing question for the dimension.
    pub question: String,
    /// Safety score: 2, 4, 6 or 8.
    pub score: u8,
    /// Risk bucket the score was derived from.
    pub risk_level: RiskLevel,
    /// Recent activity direction.
    pub trend: Trend,
    /// Risk label, metric description and incident summary.
    pub description: String,
    /// Qualifying incidents inside the recent window.
    pub recent_count: u64,
    /// All qualifying incidents in the cell.
    pub total_count: u64,
    /// Cell rate divided by the citywide rate.
    pub relative_rate: f64,
    /// When the run that produced this record started.
    pub computed_at: DateTime<Utc>,
    /// After this instant consumers should treat the record as stale.
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    fn definition(time_filter: Option<TimeFilter>) -> MetricDefinition {
        MetricDefinition {
            metric_type: MetricType::Night,
            question: "Can I go outside after dark?".to_string(),
            description: "Night".to_string(),
            category_codes: ["210", "230"].into_iter().map(String::from).collect(),
            time_filter,
        }
    }

    #[test]
    fn wrapping_hour_range_covers_midnight() {
        let filter = TimeFilter::HourRange { start: 18, end: 6 };
        for hour in [18, 19, 23, 0, 3, 5] {
            assert!(filter.matches(hour), "{hour} should match");
        }
        for hour in [6, 7, 12, 17] {
            assert!(!filter.matches(hour), "{hour} should not match");
        }
    }

    #[test]
    fn plain_hour_range_is_half_open() {
        let filter = TimeFilter::HourRange { start: 9, end: 17 };
        assert!(!filter.matches(8));
        assert!(filter.matches(9));
        assert!(filter.matches(16));
        assert!(!filter.matches(17));
    }

    #[test]
    fn qualifies_requires_code_and_time() {
        let night = definition(Some(TimeFilter::HourRange { start: 18, end: 6 }));
        assert!(night.qualifies("210", 22));
        assert!(!night.qualifies("210", 12));
        assert!(!night.qualifies("999", 22));

        let any_time = definition(None);
        assert!(any_time.qualifies("230", 12));
    }

    #[test]
    fn scores_follow_risk_order() {
        let scores: Vec<u8> = [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Maximum,
        ]
        .into_iter()
        .map(RiskLevel::score)
        .collect();
        assert_eq!(scores, vec![8, 6, 4, 2]);
    }

    #[test]
    fn labels_and_trend_strings() {
        assert_eq!(RiskLevel::Maximum.to_string(), "Maximum risk");
        assert_eq!(RiskLevel::from_str("Low risk").unwrap(), RiskLevel::Low);
        assert_eq!(Trend::Increasing.as_ref(), "up");
        assert_eq!(Trend::Decreasing.as_ref(), "down");
        assert_eq!(Trend::Stable.as_ref(), "stable");
        assert_eq!(MetricType::from_str("vehicle").unwrap(), MetricType::Vehicle);
    }
}
