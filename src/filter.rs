//! Glob filters on record identifiers.
//!
//! A filter is a glob where `*` matches any run of characters and `?` matches exactly
//! one. Filters are anchored, so `BH?` matches `BHZ` but not `BHZZ`.
//!
//! Legacy SeedSplitter filters read `?` as zero or one character and `.` as any
//! character; here `?` is exactly one character and `.` is literal.
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};
use crate::key::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Network,
    Station,
    Location,
    Channel,
}

impl Field {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Field::Network => "network",
            Field::Station => "station",
            Field::Location => "location",
            Field::Channel => "channel",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Translate a glob into an anchored regular expression. Returns `None` for globs with
/// characters that cannot appear in a SEED identifier.
fn glob_to_regex(glob: &str) -> Option<String> {
    if glob.is_empty() {
        return None;
    }
    let mut pattern = String::with_capacity(glob.len() * 2 + 2);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '.' => pattern.push_str("\\."),
            '-' => pattern.push('-'),
            c if c.is_ascii_alphanumeric() => pattern.push(c),
            _ => return None,
        }
    }
    pattern.push('$');
    Some(pattern)
}

/// Per field filters. A field without a filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    network: Option<Regex>,
    station: Option<Regex>,
    location: Option<Regex>,
    channel: Option<Regex>,
}

impl Filters {
    #[must_use]
    pub fn new() -> Self {
        Filters::default()
    }

    /// Set the filter for `field`.
    ///
    /// # Errors
    /// [Error::InvalidFilter] if `glob` is empty or has characters other than ASCII
    /// letters, digits, `-`, `.`, `*` and `?`.
    ///
    /// # Example
    /// ```
    /// use seedsplit::{Field, Filters};
    ///
    /// let filters = Filters::new().with(Field::Channel, "BH?").unwrap();
    /// assert!(filters.matches("IU", "ANMO", "00", "BHZ"));
    /// assert!(!filters.matches("IU", "ANMO", "00", "LHZ"));
    /// assert!(Filters::new().with(Field::Network, "I[U]").is_err());
    /// ```
    pub fn with(mut self, field: Field, glob: &str) -> Result<Self> {
        let invalid = || Error::InvalidFilter {
            field: field.name(),
            filter: glob.to_string(),
        };
        let pattern = glob_to_regex(glob).ok_or_else(invalid)?;
        let regex = Regex::new(&pattern).map_err(|_| invalid())?;
        *self.slot(field) = Some(regex);
        Ok(self)
    }

    /// Same as [Filters::with], but a `None` glob leaves the field unfiltered.
    ///
    /// # Errors
    /// See [Filters::with].
    pub fn with_opt(self, field: Field, glob: Option<&str>) -> Result<Self> {
        match glob {
            Some(glob) => self.with(field, glob),
            None => Ok(self),
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<Regex> {
        match field {
            Field::Network => &mut self.network,
            Field::Station => &mut self.station,
            Field::Location => &mut self.location,
            Field::Channel => &mut self.channel,
        }
    }

    fn matches_field(filter: Option<&Regex>, value: &str) -> bool {
        filter.map_or(true, |re| re.is_match(value))
    }

    /// The first field that does not match, if any.
    #[must_use]
    pub fn rejects(
        &self,
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
    ) -> Option<Field> {
        [
            (Field::Network, self.network.as_ref(), network),
            (Field::Station, self.station.as_ref(), station),
            (Field::Location, self.location.as_ref(), location),
            (Field::Channel, self.channel.as_ref(), channel),
        ]
        .into_iter()
        .find(|(_, filter, value)| !Self::matches_field(*filter, value))
        .map(|(field, _, _)| field)
    }

    #[must_use]
    pub fn matches(&self, network: &str, station: &str, location: &str, channel: &str) -> bool {
        self.rejects(network, station, location, channel).is_none()
    }

    #[must_use]
    pub fn matches_key(&self, key: &Key) -> bool {
        self.matches(&key.network, &key.station, &key.location, &key.channel)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("BH?", "BHZ", true; "single char wildcard")]
    #[test_case("BH?", "LHZ", false; "single char wildcard mismatch")]
    #[test_case("BH?", "BH", false; "question mark is exactly one")]
    #[test_case("B*", "BHZ", true; "star")]
    #[test_case("*Z", "LHZ", true; "leading star")]
    #[test_case("*", "", true; "star matches empty")]
    #[test_case("1?", "IU", false; "network mismatch")]
    #[test_case("1?", "1U", true; "network match")]
    #[test_case("--", "--", true; "blank location")]
    #[test_case("A.B", "AXB", false; "dot is literal")]
    fn glob(glob: &str, value: &str, expected: bool) {
        let filters = Filters::new().with(Field::Channel, glob).unwrap();
        assert_eq!(
            filters.matches("IU", "ANMO", "00", value),
            expected,
            "glob {glob} against {value}"
        );
    }

    #[test_case(""; "empty")]
    #[test_case("B[H]Z"; "brackets")]
    #[test_case("BH Z"; "space")]
    #[test_case("BH+"; "plus")]
    fn invalid(glob: &str) {
        let zult = Filters::new().with(Field::Station, glob);
        assert!(
            matches!(zult, Err(Error::InvalidFilter { field: "station", .. })),
            "expected invalid filter for {glob:?}"
        );
    }

    #[test]
    fn rejects_first_mismatching_field() {
        let filters = Filters::new()
            .with(Field::Network, "IU")
            .unwrap()
            .with(Field::Channel, "BH*")
            .unwrap();
        assert_eq!(filters.rejects("IU", "ANMO", "00", "BHZ"), None);
        assert_eq!(
            filters.rejects("CU", "ANMO", "00", "LHZ"),
            Some(Field::Network)
        );
        assert_eq!(
            filters.rejects("IU", "ANMO", "00", "LHZ"),
            Some(Field::Channel)
        );
    }
}
