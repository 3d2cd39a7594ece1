//! The fixed table of legal sample rates and their sample intervals.
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Every legal sample rate (Hz) paired with its sample interval in microseconds.
pub const RATES: [(f64, i64); 20] = [
    (0.001, 1_000_000_000),
    (0.01, 100_000_000),
    (0.1, 10_000_000),
    (1.0, 1_000_000),
    (2.5, 400_000),
    (4.0, 250_000),
    (5.0, 200_000),
    (10.0, 100_000),
    (20.0, 50_000),
    (40.0, 25_000),
    (50.0, 20_000),
    (100.0, 10_000),
    (200.0, 5_000),
    (250.0, 4_000),
    (400.0, 2_500),
    (500.0, 2_000),
    (1000.0, 1_000),
    (2000.0, 500),
    (4000.0, 250),
    (5000.0, 200),
];

// Rates computed from a record's factor and multiplier are not always bit-identical
// to the table values, e.g., 1/(-10 * -1).
const RATE_EPSILON: f64 = 1e-9;

pub(crate) fn lookup_interval(rate: f64) -> Option<i64> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    RATES
        .iter()
        .find(|(r, _)| ((rate - r) / r).abs() < RATE_EPSILON)
        .map(|(_, interval)| *interval)
}

/// Convert a sample rate in Hz to a sample interval in microseconds.
///
/// # Errors
/// [Error::IllegalSampleRate] if `rate` is not one of [RATES].
///
/// # Example
/// ```
/// use seedsplit::sample_rate_to_interval;
///
/// assert_eq!(sample_rate_to_interval(20.0).unwrap(), 50_000);
/// assert!(sample_rate_to_interval(3.0).is_err());
/// ```
pub fn sample_rate_to_interval(rate: f64) -> Result<i64> {
    lookup_interval(rate).ok_or(Error::IllegalSampleRate(rate))
}

/// Reverse of [sample_rate_to_interval]. Returns `None` for intervals not in [RATES].
#[must_use]
pub fn interval_to_sample_rate(interval: i64) -> Option<f64> {
    RATES
        .iter()
        .find(|(_, i)| *i == interval)
        .map(|(rate, _)| *rate)
}

/// Adjacency tolerance, as a fraction of the sample interval.
///
/// Two samples are considered adjacent if they are one interval apart, give or take
/// `fraction * interval`. This absorbs clock jitter between records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance(f64);

impl Tolerance {
    pub const DEFAULT_FRACTION: f64 = 0.01;

    /// # Panics
    /// If `fraction` is negative or not finite.
    #[must_use]
    pub fn new(fraction: f64) -> Self {
        assert!(
            fraction.is_finite() && fraction >= 0.0,
            "tolerance must be a non-negative fraction, got {fraction}"
        );
        Tolerance(fraction)
    }

    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.0
    }

    /// Slack in microseconds allowed around `interval`.
    #[must_use]
    pub fn slack(&self, interval: i64) -> i64 {
        (interval as f64 * self.0) as i64
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance(Self::DEFAULT_FRACTION)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn table_is_a_bijection() {
        let intervals: HashSet<i64> = RATES
            .iter()
            .map(|(rate, _)| sample_rate_to_interval(*rate).unwrap())
            .collect();
        assert_eq!(intervals.len(), RATES.len());

        for (rate, interval) in RATES {
            assert_eq!(interval_to_sample_rate(interval), Some(rate));
        }
    }

    #[test]
    fn computed_rates_are_accepted() {
        // factor -10, multiplier 1 => -m/f
        let rate = -1.0 / -10.0;
        assert_eq!(sample_rate_to_interval(rate).unwrap(), 10_000_000);
        // factor 1, multiplier 40
        assert_eq!(sample_rate_to_interval(1.0 * 40.0).unwrap(), 25_000);
    }

    #[test]
    fn illegal_rates() {
        for rate in [0.0, -20.0, 3.0, 20.5, 8000.0, f64::NAN, f64::INFINITY] {
            let zult = sample_rate_to_interval(rate);
            assert!(
                matches!(zult, Err(Error::IllegalSampleRate(_))),
                "expected illegal rate for {rate}, got {zult:?}"
            );
        }
    }

    #[test]
    fn slack() {
        let tol = Tolerance::default();
        assert_eq!(tol.slack(50_000), 500);
        assert_eq!(tol.slack(250), 2);
        assert_eq!(Tolerance::new(0.0).slack(50_000), 0);
    }
}
