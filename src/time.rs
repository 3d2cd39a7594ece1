//! Time conversions. All times in this crate are microseconds since the Unix epoch, UTC.
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert the components of a SEED BTIME to epoch microseconds.
///
/// `second` may be 60 to represent a leap second, which is folded into the following
/// minute. Returns `None` if the components do not describe a valid time.
#[must_use]
pub fn btime_to_micros(
    year: u16,
    day_of_year: u16,
    hour: u8,
    minute: u8,
    second: u8,
    tenth_millis: u16,
) -> Option<i64> {
    if second > 60 || tenth_millis > 9999 {
        return None;
    }
    let date = NaiveDate::from_yo_opt(i32::from(year), u32::from(day_of_year))?;
    let minute = date.and_hms_opt(u32::from(hour), u32::from(minute), 0)?;
    let dt = minute + TimeDelta::try_seconds(i64::from(second))?;
    Some(dt.and_utc().timestamp_micros() + i64::from(tenth_millis) * 100)
}

#[must_use]
pub fn to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Format as `YYYY/MM/DD HH:MM:SS.ffffff`.
#[must_use]
pub fn format_timestamp(micros: i64) -> String {
    match to_datetime(micros) {
        Some(dt) => dt.format("%Y/%m/%d %H:%M:%S%.6f").to_string(),
        None => format!("{micros}us"),
    }
}
