//! Ingestion normalizer.
//!
//! Validates raw source records into [`CrimeRecord`]s. Every record gets a
//! verdict: either a clean record or a [`Rejection`] saying why it was
//! dropped. Rejections are never fatal; they are tallied in
//! [`DiscardCounts`] so operators can gauge data quality.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use safety_map_source_models::{BoundingBox, CrimeRecord, DateField, FieldMapping, RawRecord};

use crate::parsing::{parse_datetime, parse_hhmm, value_as_code, value_as_f64};

/// Why a raw record was dropped during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Timestamp missing or unparseable.
    #[error("missing or unparseable occurrence date")]
    InvalidDate,
    /// Timestamp strictly after the run's reference time.
    #[error("occurrence date is in the future")]
    FutureDate,
    /// Coordinates missing, unparseable, or outside the bounding box.
    #[error("missing, unparseable, or out-of-bounds coordinates")]
    InvalidCoordinates,
    /// Offense code missing or blank.
    #[error("missing category code")]
    MissingCategory,
}

/// Per-reason tally of dropped records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardCounts {
    /// Records with a missing or unparseable date.
    pub invalid_date: u64,
    /// Records dated after the run's reference time.
    pub future_date: u64,
    /// Records with bad or out-of-bounds coordinates.
    pub invalid_coordinates: u64,
    /// Records without an offense code.
    pub missing_category: u64,
}

impl DiscardCounts {
    /// Counts one rejection.
    pub const fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::InvalidDate => self.invalid_date += 1,
            Rejection::FutureDate => self.future_date += 1,
            Rejection::InvalidCoordinates => self.invalid_coordinates += 1,
            Rejection::MissingCategory => self.missing_category += 1,
        }
    }

    /// Total number of dropped records.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.invalid_date + self.future_date + self.invalid_coordinates + self.missing_category
    }
}

/// Output of [`normalize_records`].
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Records that passed validation, in input order.
    pub records: Vec<CrimeRecord>,
    /// Why the others were dropped.
    pub discards: DiscardCounts,
}

impl Normalized {
    /// Earliest and latest occurrence among the valid records.
    #[must_use]
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let earliest = self.records.iter().map(|r| r.occurred_at).min()?;
        let latest = self.records.iter().map(|r| r.occurred_at).max()?;
        Some((earliest, latest))
    }
}

/// Extracts the occurrence timestamp according to `field`.
///
/// For [`DateField::DatePlusHhmm`] the time string replaces the time of day
/// of the date field; a missing or malformed time string falls back to the
/// date field alone. The result keeps the offset the source reported.
#[must_use]
pub fn extract_occurred_at(
    record: &RawRecord,
    field: &DateField,
) -> Option<DateTime<FixedOffset>> {
    match field {
        DateField::Simple { field } => parse_datetime(record.get(field)?.as_str()?),
        DateField::DatePlusHhmm {
            date_field,
            time_field,
        } => {
            let date = parse_datetime(record.get(date_field)?.as_str()?)?;
            let Some(time) = record.get(time_field).and_then(parse_hhmm) else {
                return Some(date);
            };
            NaiveDateTime::new(date.date_naive(), time)
                .and_local_timezone(*date.offset())
                .single()
        }
    }
}

/// Validates one raw record.
///
/// Checks run in order: date, future date, coordinates, category.
///
/// # Errors
///
/// Returns the first [`Rejection`] the record fails.
pub fn validate_record(
    record: &RawRecord,
    mapping: &FieldMapping,
    bbox: &BoundingBox,
    now: DateTime<Utc>,
) -> Result<CrimeRecord, Rejection> {
    let occurred_at =
        extract_occurred_at(record, &mapping.occurred_at).ok_or(Rejection::InvalidDate)?;
    if occurred_at.with_timezone(&Utc) > now {
        return Err(Rejection::FutureDate);
    }

    let latitude = record.get(&mapping.latitude).and_then(value_as_f64);
    let longitude = record.get(&mapping.longitude).and_then(value_as_f64);
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Err(Rejection::InvalidCoordinates);
    };
    if !bbox.contains(latitude, longitude) {
        return Err(Rejection::InvalidCoordinates);
    }

    let category_code = record
        .get(&mapping.category_code)
        .and_then(value_as_code)
        .ok_or(Rejection::MissingCategory)?;

    Ok(CrimeRecord::from_local(
        occurred_at,
        latitude,
        longitude,
        category_code,
    ))
}

/// Validates a batch of raw records against one reference time.
#[must_use]
pub fn normalize_records(
    raw: &[RawRecord],
    mapping: &FieldMapping,
    bbox: &BoundingBox,
    now: DateTime<Utc>,
) -> Normalized {
    let mut normalized = Normalized {
        records: Vec::with_capacity(raw.len()),
        discards: DiscardCounts::default(),
    };

    for record in raw {
        match validate_record(record, mapping, bbox, now) {
            Ok(valid) => normalized.records.push(valid),
            Err(rejection) => {
                log::trace!("Dropping record: {rejection}");
                normalized.discards.record(rejection);
            }
        }
    }

    let discards = &normalized.discards;
    log::info!(
        "Normalized {} of {} raw records ({} dropped)",
        normalized.records.len(),
        raw.len(),
        discards.total()
    );
    if discards.total() > 0 {
        log::warn!(
            "Dropped records: {} invalid dates, {} future dates, \
             {} invalid coordinates, {} missing categories",
            discards.invalid_date,
            discards.future_date,
            discards.invalid_coordinates,
            discards.missing_category
        );
    }
    if let Some((earliest, latest)) = normalized.date_range() {
        log::info!("Date range: {earliest} to {latest}");
    }

    normalized
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawRecord {
        let serde_json::Value::Object(map) = value else {
            panic!("fixture must be an object");
        };
        map
    }

    fn canonical(occurred_at: &str, lat: serde_json::Value, lon: serde_json::Value) -> RawRecord {
        raw(json!({
            "occurred_at": occurred_at,
            "latitude": lat,
            "longitude": lon,
            "category_code": "330",
        }))
    }

    #[test]
    fn accepts_valid_canonical_record() {
        let record = canonical("2025-01-10T22:15:00", json!("34.05"), json!(-118.25));
        let valid = validate_record(
            &record,
            &FieldMapping::canonical(),
            &BoundingBox::LOS_ANGELES,
            now(),
        )
        .unwrap();
        assert_eq!(valid.category_code, "330");
        assert_eq!(valid.hour_of_day, 22);
        assert!((valid.latitude - 34.05).abs() < f64::EPSILON);
    }

    #[test]
    fn offset_timestamp_keeps_local_hour() {
        let record = raw(json!({
            "occurred_at": "2025-01-15T22:00:00-08:00",
            "latitude": 34.05,
            "longitude": -118.25,
            "category_code": "210",
        }));
        let valid = validate_record(
            &record,
            &FieldMapping::canonical(),
            &BoundingBox::LOS_ANGELES,
            now(),
        )
        .unwrap();
        assert_eq!(valid.hour_of_day, 22);
        assert_eq!(valid.occurred_at.to_string(), "2025-01-16 06:00:00 UTC");

        let night = safety_map_metrics_models::registry::all_metrics()
            .into_iter()
            .find(|m| m.metric_type == safety_map_metrics_models::MetricType::Night)
            .unwrap();
        assert!(night.qualifies(&valid.category_code, valid.hour_of_day));
    }

    #[test]
    fn combines_lapd_date_and_time() {
        let record = raw(json!({
            "date_occ": "2025-01-10T00:00:00.000",
            "time_occ": "2130",
            "lat": "34.0522",
            "lon": "-118.2437",
            "crm_cd": "510",
        }));
        let valid =
            validate_record(&record, &FieldMapping::lapd(), &BoundingBox::LOS_ANGELES, now())
                .unwrap();
        assert_eq!(valid.occurred_at.to_string(), "2025-01-10 21:30:00 UTC");
        assert_eq!(valid.hour_of_day, 21);
    }

    #[test]
    fn lapd_falls_back_to_date_without_time() {
        let record = raw(json!({
            "date_occ": "2025-01-10T00:00:00.000",
            "lat": "34.0522",
            "lon": "-118.2437",
            "crm_cd": "510",
        }));
        let valid =
            validate_record(&record, &FieldMapping::lapd(), &BoundingBox::LOS_ANGELES, now())
                .unwrap();
        assert_eq!(valid.hour_of_day, 0);
    }

    #[test]
    fn rejects_future_record_by_one_day() {
        let tomorrow = (now() + Duration::days(1)).to_rfc3339();
        let record = canonical(&tomorrow, json!(34.05), json!(-118.25));
        assert_eq!(
            validate_record(
                &record,
                &FieldMapping::canonical(),
                &BoundingBox::LOS_ANGELES,
                now()
            ),
            Err(Rejection::FutureDate)
        );
    }

    #[test]
    fn record_at_now_is_not_future() {
        let record = canonical(&now().to_rfc3339(), json!(34.05), json!(-118.25));
        assert!(
            validate_record(
                &record,
                &FieldMapping::canonical(),
                &BoundingBox::LOS_ANGELES,
                now()
            )
            .is_ok()
        );
    }

    #[test]
    fn rejects_out_of_bounds_and_garbage_coordinates() {
        let mapping = FieldMapping::canonical();
        let bbox = BoundingBox::LOS_ANGELES;
        for (lat, lon) in [
            (json!(40.71), json!(-74.0)),
            (json!(0.0), json!(0.0)),
            (json!("abc"), json!(-118.25)),
            (json!(null), json!(-118.25)),
        ] {
            let record = canonical("2025-01-10T12:00:00", lat, lon);
            assert_eq!(
                validate_record(&record, &mapping, &bbox, now()),
                Err(Rejection::InvalidCoordinates)
            );
        }
    }

    #[test]
    fn rejects_missing_category() {
        let record = raw(json!({
            "occurred_at": "2025-01-10T12:00:00",
            "latitude": 34.05,
            "longitude": -118.25,
        }));
        assert_eq!(
            validate_record(
                &record,
                &FieldMapping::canonical(),
                &BoundingBox::LOS_ANGELES,
                now()
            ),
            Err(Rejection::MissingCategory)
        );
    }

    #[test]
    fn batch_counts_each_reason() {
        let tomorrow = (now() + Duration::days(1)).to_rfc3339();
        let records = vec![
            canonical("2025-01-10T12:00:00", json!(34.05), json!(-118.25)),
            canonical("garbage", json!(34.05), json!(-118.25)),
            canonical(&tomorrow, json!(34.05), json!(-118.25)),
            canonical("2025-01-10T12:00:00", json!(35.5), json!(-118.25)),
            canonical("2025-01-11T12:00:00", json!(34.10), json!(-118.30)),
        ];

        let normalized = normalize_records(
            &records,
            &FieldMapping::canonical(),
            &BoundingBox::LOS_ANGELES,
            now(),
        );

        assert_eq!(normalized.records.len(), 2);
        assert_eq!(
            normalized.discards,
            DiscardCounts {
                invalid_date: 1,
                future_date: 1,
                invalid_coordinates: 1,
                missing_category: 0,
            }
        );
        assert_eq!(normalized.discards.total(), 3);

        let (earliest, latest) = normalized.date_range().unwrap();
        assert_eq!(earliest.to_string(), "2025-01-10 12:00:00 UTC");
        assert_eq!(latest.to_string(), "2025-01-11 12:00:00 UTC");
    }
}
