//! Trend analyzer.
//!
//! Compares the annualized rate inside the recent window to the annualized
//! rate over the whole observed span. A plain ratio heuristic, not a
//! significance test.

use safety_map_metrics_models::Trend;

const DAYS_PER_YEAR: f64 = 365.0;

/// Recent rate above `historical * INCREASE_RATIO` is increasing.
pub const INCREASE_RATIO: f64 = 1.2;

/// Recent rate below `historical * DECREASE_RATIO` is decreasing.
pub const DECREASE_RATIO: f64 = 0.8;

/// Annualized incident rates for one (cell, metric) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendRates {
    /// Incidents per year inside the recent window.
    pub recent: f64,
    /// Incidents per year over the full span.
    pub historical: f64,
}

impl TrendRates {
    /// `days_span` is the age of the oldest qualifying incident; spans under
    /// one day count as one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        recent_count: u64,
        total_count: u64,
        days_span: f64,
        recent_window_days: f64,
    ) -> Self {
        Self {
            recent: recent_count as f64 / recent_window_days * DAYS_PER_YEAR,
            historical: total_count as f64 / days_span.max(1.0) * DAYS_PER_YEAR,
        }
    }

    /// Classifies the pair of rates.
    #[must_use]
    pub fn classify(self) -> Trend {
        if self.recent > self.historical * INCREASE_RATIO {
            Trend::Increasing
        } else if self.recent < self.historical * DECREASE_RATIO {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(recent: f64, historical: f64) -> TrendRates {
        TrendRates { recent, historical }
    }

    #[test]
    fn band_edges_are_stable() {
        assert_eq!(rates(120.0, 100.0).classify(), Trend::Stable);
        assert_eq!(rates(80.0, 100.0).classify(), Trend::Stable);
        assert_eq!(rates(100.0, 100.0).classify(), Trend::Stable);
    }

    #[test]
    fn strictly_outside_band_moves() {
        assert_eq!(rates(120.01, 100.0).classify(), Trend::Increasing);
        assert_eq!(rates(79.99, 100.0).classify(), Trend::Decreasing);
    }

    #[test]
    fn no_recent_incidents_is_decreasing() {
        let rates = TrendRates::from_counts(0, 4, 365.0, 90.0);
        assert!(rates.recent.abs() < f64::EPSILON);
        assert!((rates.historical - 4.0).abs() < 1e-12);
        assert_eq!(rates.classify(), Trend::Decreasing);
    }

    #[test]
    fn all_incidents_recent_over_short_span() {
        // 3 incidents, all within the last 30 days.
        let rates = TrendRates::from_counts(3, 3, 30.0, 90.0);
        assert!((rates.recent - 3.0 / 90.0 * 365.0).abs() < 1e-9);
        assert!((rates.historical - 3.0 / 30.0 * 365.0).abs() < 1e-9);
        assert_eq!(rates.classify(), Trend::Decreasing);
    }

    #[test]
    fn concentrated_recent_activity_is_increasing() {
        // 10 incidents over two years, 5 of them in the last 90 days.
        let rates = TrendRates::from_counts(5, 10, 730.0, 90.0);
        assert_eq!(rates.classify(), Trend::Increasing);
    }

    #[test]
    fn span_under_a_day_counts_as_one() {
        let rates = TrendRates::from_counts(1, 1, 0.25, 90.0);
        assert!((rates.historical - 365.0).abs() < 1e-9);
    }
}
