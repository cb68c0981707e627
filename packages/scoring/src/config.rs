//! Run-wide scoring parameters.

use safety_map_source_models::BoundingBox;

use crate::ScoringError;

/// Grid cell size in degrees (~1 km at LA's latitude).
pub const DEFAULT_RESOLUTION: f64 = 0.01;

/// Age at which an incident counts half as much as a new one.
pub const HALF_LIFE_DAYS: f64 = 180.0;

/// Window treated as "recent" for trend and diagnostic counts.
pub const RECENT_WINDOW_DAYS: f64 = 90.0;

/// How long emitted scores stay fresh.
pub const EXPIRY_DAYS: i64 = 30;

/// Parameters fixed for the duration of one scoring run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Records outside this box are dropped during normalization.
    pub bbox: BoundingBox,
    /// Grid cell size in degrees, on both axes.
    pub resolution: f64,
    /// Half-life of the recency weight, in days.
    pub half_life_days: f64,
    /// Size of the recent window, in days.
    pub recent_window_days: f64,
    /// Days until emitted metrics expire.
    pub expiry_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::LOS_ANGELES,
            resolution: DEFAULT_RESOLUTION,
            half_life_days: HALF_LIFE_DAYS,
            recent_window_days: RECENT_WINDOW_DAYS,
            expiry_days: EXPIRY_DAYS,
        }
    }
}

impl ScoringConfig {
    /// Checks that every parameter is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidConfig`] for a non-positive or
    /// non-finite resolution, half-life or recent window, a negative
    /// expiry, or an inverted bounding box.
    pub fn validate(&self) -> Result<(), ScoringError> {
        let positive = |value: f64| value.is_finite() && value > 0.0;

        if !positive(self.resolution) {
            return Err(invalid(format!("resolution {} must be > 0", self.resolution)));
        }
        if !positive(self.half_life_days) {
            return Err(invalid(format!(
                "half-life {} must be > 0",
                self.half_life_days
            )));
        }
        if !positive(self.recent_window_days) {
            return Err(invalid(format!(
                "recent window {} must be > 0",
                self.recent_window_days
            )));
        }
        if self.expiry_days < 0 {
            return Err(invalid(format!(
                "expiry {} must not be negative",
                self.expiry_days
            )));
        }
        let bbox = &self.bbox;
        if !(bbox.south < bbox.north && bbox.west < bbox.east) {
            return Err(invalid(format!("bounding box {bbox:?} is empty")));
        }

        Ok(())
    }
}

const fn invalid(message: String) -> ScoringError {
    ScoringError::InvalidConfig { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ScoringConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_resolution() {
        let config = ScoringConfig {
            resolution: 0.0,
            ..ScoringConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScoringError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_inverted_bbox() {
        let config = ScoringConfig {
            bbox: BoundingBox::new(-117.65, 33.70, -118.67, 34.83),
            ..ScoringConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
