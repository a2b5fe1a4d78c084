//! The duration rule shared by the lifecycle and the storage trigger.
//!
//! Elapsed time is measured in whole milliseconds and rounded to the nearest
//! minute, halves rounding up. The SQLite trigger in `tt-db` evaluates the
//! same integer expression, so client-side predictions and persisted values
//! never drift.

use chrono::{DateTime, SubsecRound, Utc};

const MS_PER_MINUTE: i64 = 60_000;
const HALF_MINUTE_MS: i64 = 30_000;

/// Truncates an instant to the millisecond precision used for storage.
#[must_use]
pub fn to_storage_precision(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

/// Computes the derived duration in minutes for a closed interval.
///
/// Returns `None` when `end` is before `start`.
#[must_use]
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<i64> {
    let elapsed_ms = to_storage_precision(end).timestamp_millis()
        - to_storage_precision(start).timestamp_millis();
    if elapsed_ms < 0 {
        return None;
    }
    Some((elapsed_ms + HALF_MINUTE_MS) / MS_PER_MINUTE)
}

/// Formats minutes as `Xh Ym` when at least an hour, otherwise `Ym`.
///
/// Negative values are treated as 0m.
#[must_use]
pub fn format_minutes(minutes: i64) -> String {
    if minutes <= 0 {
        return "0m".to_string();
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{hours}h {mins:02}m")
    } else {
        format!("{mins}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn ninety_minutes() {
        assert_eq!(duration_minutes(at(9, 0, 0), at(10, 30, 0)), Some(90));
    }

    #[test]
    fn rounds_to_nearest_minute() {
        let start = at(9, 0, 0);
        assert_eq!(duration_minutes(start, start + Duration::seconds(29)), Some(0));
        assert_eq!(duration_minutes(start, start + Duration::seconds(30)), Some(1));
        assert_eq!(duration_minutes(start, start + Duration::seconds(89)), Some(1));
        assert_eq!(duration_minutes(start, start + Duration::seconds(90)), Some(2));
        assert_eq!(
            duration_minutes(start, start + Duration::milliseconds(29_999)),
            Some(0)
        );
    }

    #[test]
    fn sub_millisecond_precision_is_ignored() {
        let start = at(9, 0, 0);
        let end = start + Duration::milliseconds(29_999) + Duration::microseconds(999);
        assert_eq!(duration_minutes(start, end), Some(0));
    }

    #[test]
    fn zero_length_interval() {
        assert_eq!(duration_minutes(at(9, 0, 0), at(9, 0, 0)), Some(0));
    }

    #[test]
    fn reversed_interval_is_rejected() {
        assert_eq!(duration_minutes(at(10, 0, 0), at(9, 0, 0)), None);
        assert_eq!(
            duration_minutes(at(10, 0, 0), at(10, 0, 0) - Duration::milliseconds(1)),
            None
        );
    }

    #[test]
    fn format_minutes_variants() {
        assert_eq!(format_minutes(-5), "0m");
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(90), "1h 30m");
        assert_eq!(format_minutes(605), "10h 05m");
    }
}
