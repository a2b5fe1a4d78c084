//! Reporting periods shared by `tt entries` and `tt report`.
//!
//! Calendar periods are computed in a caller-supplied timezone (the local
//! one at runtime) and returned as half-open UTC intervals.

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use clap::Args;

use super::util::parse_datetime;

/// Period selection flags.
#[derive(Debug, Clone, Default, Args)]
pub struct PeriodArgs {
    /// Today.
    #[arg(long, group = "period")]
    pub day: bool,

    /// Yesterday.
    #[arg(long, group = "period")]
    pub last_day: bool,

    /// This week, Monday to Sunday (the default).
    #[arg(long, group = "period")]
    pub week: bool,

    /// Last week.
    #[arg(long, group = "period")]
    pub last_week: bool,

    /// Start of a custom range (RFC 3339 or "N units ago").
    #[arg(long, value_name = "TIME", group = "period")]
    pub since: Option<String>,

    /// End of a custom range. Defaults to now.
    #[arg(long, value_name = "TIME", requires = "since")]
    pub until: Option<String>,
}

/// Report period type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    LastWeek,
    Day,
    LastDay,
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl PeriodArgs {
    /// Resolves the flags into a period. Relative times count back from `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Period> {
        if let Some(since) = &self.since {
            let start = parse_datetime(since, now)?;
            let end = match &self.until {
                Some(until) => parse_datetime(until, now)?,
                None => now,
            };
            if end < start {
                bail!("--until must not be before --since");
            }
            return Ok(Period::Range { start, end });
        }
        Ok(if self.day {
            Period::Day
        } else if self.last_day {
            Period::LastDay
        } else if self.last_week {
            Period::LastWeek
        } else {
            Period::Week
        })
    }
}

impl Period {
    /// Half-open `[start, end)` interval for this period, with `today` taken in `tz`.
    pub fn boundaries<Tz: TimeZone>(self, today: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::Week => week_boundaries(today, tz),
            Self::LastWeek => week_boundaries(today - Duration::days(7), tz),
            Self::Day => day_boundaries(today, tz),
            Self::LastDay => day_boundaries(today - Duration::days(1), tz),
            Self::Range { start, end } => (start, end),
        }
    }

    /// Human description of the period, e.g. "Week of Jan 27, 2025".
    pub fn describe<Tz: TimeZone>(self, start: DateTime<Utc>, end: DateTime<Utc>, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let start_date = start.with_timezone(tz).date_naive();
        match self {
            Self::Week | Self::LastWeek => format!("Week of {}", start_date.format("%b %-d, %Y")),
            Self::Day | Self::LastDay => start_date.format("%A, %b %-d, %Y").to_string(),
            Self::Range { .. } => format!(
                "{} to {}",
                start.with_timezone(tz).format("%b %-d, %Y %H:%M"),
                end.with_timezone(tz).format("%b %-d, %Y %H:%M")
            ),
        }
    }
}

/// Converts a local date at midnight to UTC.
///
/// Ambiguous midnights (DST fall-back) resolve to the earlier instant. A
/// midnight skipped by DST falls back to 1am.
fn local_midnight_to_utc<Tz: TimeZone>(local_date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = local_date.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc))
}

/// Calculates week boundaries (Mon 00:00 to next Mon 00:00 local time).
fn week_boundaries<Tz: TimeZone>(today: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_monday = today.weekday().num_days_from_monday();
    let monday = today - Duration::days(i64::from(days_since_monday));
    let next_monday = monday + Duration::days(7);
    (
        local_midnight_to_utc(monday, tz),
        local_midnight_to_utc(next_monday, tz),
    )
}

/// Calculates day boundaries (00:00 to next day 00:00 local time).
fn day_boundaries<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = day + Duration::days(1);
    (local_midnight_to_utc(day, tz), local_midnight_to_utc(next, tz))
}
