#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw and normalized crime record types.
//!
//! Every data source yields loosely-typed [`RawRecord`]s. The ingestion
//! normalizer turns the ones that pass validation into [`CrimeRecord`]s,
//! the only record type the scoring engine ever sees.

use chrono::{DateTime, FixedOffset, Timelike as _, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A record exactly as the data source returned it.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A geographic bounding box in WGS84 coordinates. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// The City of Los Angeles service area.
    pub const LOS_ANGELES: Self = Self::new(-118.67, 33.70, -117.65, 34.83);

    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns whether the point lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude) && (self.west..=self.east).contains(&longitude)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::LOS_ANGELES
    }
}

/// A crime incident that passed ingestion validation.
///
/// Immutable once built: the timestamp is in the past relative to the run,
/// the coordinates lie inside the run's bounding box, and the category code
/// is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeRecord {
    /// When the incident occurred.
    pub occurred_at: DateTime<Utc>,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Source offense code (e.g. LAPD `crm_cd` "330").
    pub category_code: String,
    /// Hour of the incident on the local clock it was reported in, 0-23.
    pub hour_of_day: u32,
}

impl CrimeRecord {
    /// Builds a record, deriving `hour_of_day` from the timestamp.
    #[must_use]
    pub fn new(
        occurred_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        category_code: impl Into<String>,
    ) -> Self {
        Self {
            occurred_at,
            latitude,
            longitude,
            category_code: category_code.into(),
            hour_of_day: occurred_at.hour(),
        }
    }

    /// Builds a record from a timestamp that carries its reporting offset.
    ///
    /// `hour_of_day` comes from the local clock time, so `22:00-08:00` is
    /// hour 22 even though it is 06:00 UTC.
    #[must_use]
    pub fn from_local(
        occurred_at: DateTime<FixedOffset>,
        latitude: f64,
        longitude: f64,
        category_code: impl Into<String>,
    ) -> Self {
        Self {
            occurred_at: occurred_at.with_timezone(&Utc),
            latitude,
            longitude,
            category_code: category_code.into(),
            hour_of_day: occurred_at.hour(),
        }
    }
}

/// How to extract the occurrence timestamp from a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DateField {
    /// A single date or datetime field.
    Simple {
        /// JSON field name.
        field: String,
    },
    /// Date field + 4-character HHMM time string.
    DatePlusHhmm {
        /// JSON field for the date portion.
        date_field: String,
        /// JSON field for the HHMM time string.
        time_field: String,
    },
}

/// Built-in field layouts, selectable from the command line.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappingPreset {
    /// `occurred_at`, `latitude`, `longitude`, `category_code`.
    Canonical,
    /// The LAPD Socrata layout (`date_occ` + `time_occ`, `lat`, `lon`, `crm_cd`).
    Lapd,
}

/// Maps source-specific JSON field names to [`CrimeRecord`] fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// How to extract `occurred_at`.
    pub occurred_at: DateField,
    /// Latitude field name.
    pub latitude: String,
    /// Longitude field name.
    pub longitude: String,
    /// Offense code field name.
    pub category_code: String,
}

impl FieldMapping {
    /// Field names matching [`CrimeRecord`] one to one.
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            occurred_at: DateField::Simple {
                field: "occurred_at".to_string(),
            },
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            category_code: "category_code".to_string(),
        }
    }

    /// The LAPD "Crime Data from 2020 to Present" dataset layout.
    #[must_use]
    pub fn lapd() -> Self {
        Self {
            occurred_at: DateField::DatePlusHhmm {
                date_field: "date_occ".to_string(),
                time_field: "time_occ".to_string(),
            },
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
            category_code: "crm_cd".to_string(),
        }
    }
}

impl From<MappingPreset> for FieldMapping {
    fn from(preset: MappingPreset) -> Self {
        match preset {
            MappingPreset::Canonical => Self::canonical(),
            MappingPreset::Lapd => Self::lapd(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn bounding_box_includes_edges() {
        let bbox = BoundingBox::LOS_ANGELES;
        assert!(bbox.contains(33.70, -118.67));
        assert!(bbox.contains(34.83, -117.65));
        assert!(bbox.contains(34.05, -118.25));
        assert!(!bbox.contains(33.69, -118.25));
        assert!(!bbox.contains(34.05, -117.64));
        assert!(!bbox.contains(f64::NAN, -118.25));
    }

    #[test]
    fn crime_record_derives_hour() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 21, 45, 0).unwrap();
        let record = CrimeRecord::new(at, 34.0, -118.3, "330");
        assert_eq!(record.hour_of_day, 21);
    }

    #[test]
    fn crime_record_keeps_local_hour_from_offset() {
        let at = DateTime::parse_from_rfc3339("2025-01-15T22:00:00-08:00").unwrap();
        let record = CrimeRecord::from_local(at, 34.0, -118.3, "210");
        assert_eq!(record.hour_of_day, 22);
        assert_eq!(record.occurred_at.to_string(), "2025-01-16 06:00:00 UTC");
    }

    #[test]
    fn preset_parses_from_cli_string() {
        let preset: MappingPreset = "lapd".parse().unwrap();
        assert_eq!(FieldMapping::from(preset), FieldMapping::lapd());
    }
}
