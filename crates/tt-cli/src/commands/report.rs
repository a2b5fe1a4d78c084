//! Report command for summarising tracked time.
//!
//! This module implements `tt report` with various period options
//! (--week, --last-week, --day, --last-day, --since/--until) and output
//! formats (human-readable, JSON). Only stopped entries are counted.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Args;
use serde::Serialize;
use tt_core::{UserId, format_minutes};
use tt_db::{Database, DayTotal, ProjectTotal};

use super::period::{Period, PeriodArgs};

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub period: PeriodArgs,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Computed report data.
#[derive(Debug)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub period: Period,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub projects: Vec<ProjectTotal>,
    pub days: Vec<DayTotal>,
}

impl ReportData {
    fn total_minutes(&self) -> i64 {
        self.projects.iter().map(|p| p.minutes).sum()
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

// ========== Report Generation ==========

/// Generates report data from the database.
pub fn generate_report_data<Tz: TimeZone>(
    db: &Database,
    actor: &UserId,
    period: Period,
    generated_at: DateTime<Utc>,
    tz: &Tz,
) -> Result<ReportData> {
    let today = generated_at.with_timezone(tz).date_naive();
    let (period_start, period_end) = period.boundaries(today, tz);

    let projects = db
        .project_totals(actor, period_start, period_end)?
        .into_iter()
        .filter(|p| p.minutes > 0)
        .collect();
    let days = db
        .daily_totals(actor, period_start, period_end, tz)?
        .into_iter()
        .filter(|d| d.minutes > 0)
        .collect();

    Ok(ReportData {
        generated_at,
        period,
        period_start,
        period_end,
        projects,
        days,
    })
}

/// Formats the human-readable report output.
pub fn format_report<Tz: TimeZone>(data: &ReportData, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut output = String::new();
    let description = data.period.describe(data.period_start, data.period_end, tz);
    // Writing to a String cannot fail.
    let _ = writeln!(output, "TIME REPORT: {description}");

    if data.projects.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No time recorded in this period.");
        return output;
    }

    let total = data.total_minutes();
    let max = data.projects.iter().map(|p| p.minutes).max().unwrap_or(0);
    let width = data
        .projects
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(12);

    let _ = writeln!(output);
    let _ = writeln!(output, "BY PROJECT");
    let _ = writeln!(output, "──────────");
    for project in &data.projects {
        let _ = writeln!(
            output,
            "{:<width$}  {:>7}  {}  ({} {})",
            project.name,
            format_minutes(project.minutes),
            progress_bar(project.minutes, max),
            project.entries,
            if project.entries == 1 { "entry" } else { "entries" }
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "BY DAY");
    let _ = writeln!(output, "──────");
    for day in &data.days {
        let _ = writeln!(
            output,
            "{}  {:>7}",
            day.day.format("%a %b %-d"),
            format_minutes(day.minutes)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "SUMMARY");
    let _ = writeln!(output, "───────");
    let _ = writeln!(output, "Total tracked:  {}", format_minutes(total));
    output
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: String,
    pub period: JsonPeriod,
    pub projects: &'a [ProjectTotal],
    pub days: &'a [DayTotal],
    pub total_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct JsonPeriod {
    pub start: String,
    pub end: String,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

/// Formats report data as JSON.
pub fn format_report_json<Tz: TimeZone>(data: &ReportData, tz: &Tz) -> Result<String> {
    let first_day = data.period_start.with_timezone(tz).date_naive();
    // period_end is exclusive; the last covered day is the one just before it.
    let last_day = (data.period_end - chrono::Duration::milliseconds(1))
        .with_timezone(tz)
        .date_naive()
        .max(first_day);

    let report = JsonReport {
        generated_at: data.generated_at.to_rfc3339(),
        period: JsonPeriod {
            start: data.period_start.to_rfc3339(),
            end: data.period_end.to_rfc3339(),
            first_day,
            last_day,
        },
        projects: &data.projects,
        days: &data.days,
        total_minutes: data.total_minutes(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

// ========== Public Interface ==========

/// Runs the report command.
pub fn run<W: Write, Tz: TimeZone>(
    writer: &mut W,
    db: &Database,
    actor: &UserId,
    args: &ReportArgs,
    tz: &Tz,
) -> Result<()>
where
    Tz::Offset: std::fmt::Display,
{
    let generated_at = db.now();
    let period = args.period.resolve(generated_at)?;
    let data = generate_report_data(db, actor, period, generated_at, tz)?;

    if args.json {
        writeln!(writer, "{}", format_report_json(&data, tz)?)?;
    } else {
        write!(writer, "{}", format_report(&data, tz))?;
    }
    Ok(())
}
