use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rate::interval_to_sample_rate;

/// Location code used for records with a blank location.
pub const BLANK_LOCATION: &str = "--";

/// Identity of one time series track.
///
/// Tracks of the same channel at different sample rates have different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    /// Sample interval in microseconds.
    pub interval: i64,
}

impl Key {
    /// A blank `location` is replaced with [BLANK_LOCATION].
    #[must_use]
    pub fn new(network: &str, station: &str, location: &str, channel: &str, interval: i64) -> Self {
        Key {
            network: network.to_string(),
            station: station.to_string(),
            location: location_code(location).to_string(),
            channel: channel.to_string(),
            interval,
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        interval_to_sample_rate(self.interval).unwrap_or(1e6 / self.interval as f64)
    }

    /// True if this key has the same network, station, location and channel, ignoring
    /// the sample rate.
    #[must_use]
    pub fn same_channel(&self, network: &str, station: &str, location: &str, channel: &str) -> bool {
        self.network == network
            && self.station == station
            && self.location == location_code(location)
            && self.channel == channel
    }
}

/// Location code with blank replaced by [BLANK_LOCATION].
#[must_use]
pub fn location_code(location: &str) -> &str {
    if location.trim().is_empty() {
        BLANK_LOCATION
    } else {
        location
    }
}

impl fmt::Display for Key {
    /// `IU_ANMO 00-BHZ (20.0 Hz)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{} {}-{} ({:.1} Hz)",
            self.network,
            self.station,
            self.location,
            self.channel,
            self.sample_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let key = Key::new("IU", "ANMO", "00", "BHZ", 50_000);
        assert_eq!(key.to_string(), "IU_ANMO 00-BHZ (20.0 Hz)");

        let key = Key::new("IU", "ANMO", "", "LHZ", 1_000_000);
        assert_eq!(key.to_string(), "IU_ANMO ---LHZ (1.0 Hz)");
        assert!(key.same_channel("IU", "ANMO", "  ", "LHZ"));
    }

    #[test]
    fn rate_distinguishes_keys() {
        let a = Key::new("IU", "ANMO", "00", "BHZ", 50_000);
        let b = Key::new("IU", "ANMO", "00", "BHZ", 25_000);
        assert_ne!(a, b);
        assert!(a.same_channel("IU", "ANMO", "00", "BHZ"));
        assert!(b.same_channel("IU", "ANMO", "00", "BHZ"));
    }
}
