//! Risk scorer: maps a cell's relative rate onto the four-level scale.

use safety_map_metrics_models::RiskLevel;

/// Upper bound (inclusive) of each level, checked in order.
const THRESHOLDS: [(f64, RiskLevel); 3] = [
    (0.3, RiskLevel::Low),
    (0.7, RiskLevel::Medium),
    (1.5, RiskLevel::High),
];

/// Local rate over citywide rate. A degenerate baseline (no qualifying
/// weight anywhere) is neutral.
#[must_use]
pub fn relative_rate(local_rate: f64, citywide_rate: f64) -> f64 {
    if citywide_rate > 0.0 {
        local_rate / citywide_rate
    } else {
        1.0
    }
}

/// First threshold the relative rate does not exceed wins.
#[must_use]
pub fn classify(relative_rate: f64) -> RiskLevel {
    THRESHOLDS
        .iter()
        .find(|(limit, _)| relative_rate <= *limit)
        .map_or(RiskLevel::Maximum, |(_, level)| *level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_scenarios() {
        let low = classify(relative_rate(0.02, 0.10));
        assert_eq!(low, RiskLevel::Low);
        assert_eq!(low.score(), 8);
        assert_eq!(low.to_string(), "Low risk");

        let max = classify(relative_rate(0.20, 0.10));
        assert_eq!(max, RiskLevel::Maximum);
        assert_eq!(max.score(), 2);
        assert_eq!(max.to_string(), "Maximum risk");
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(classify(0.3), RiskLevel::Low);
        assert_eq!(classify(0.300_001), RiskLevel::Medium);
        assert_eq!(classify(0.7), RiskLevel::Medium);
        assert_eq!(classify(1.5), RiskLevel::High);
        assert_eq!(classify(1.500_001), RiskLevel::Maximum);
        assert_eq!(classify(0.0), RiskLevel::Low);
    }

    #[test]
    fn zero_baseline_is_neutral() {
        assert!((relative_rate(0.4, 0.0) - 1.0).abs() < f64::EPSILON);
        assert_eq!(classify(relative_rate(0.4, 0.0)), RiskLevel::High);
    }

    #[test]
    fn score_never_increases_with_relative_rate() {
        let mut previous = u8::MAX;
        for step in 0..=400 {
            let score = classify(f64::from(step) * 0.01).score();
            assert!(score <= previous, "score rose at {}", f64::from(step) * 0.01);
            previous = score;
        }
    }
}
