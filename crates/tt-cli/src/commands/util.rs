//! Shared utilities for CLI commands.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use regex::Regex;
use tt_core::{Category, NewEntry, ProjectId, TaskId, UserId};
use tt_db::{Database, ProjectRecord};

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").expect("relative time regex is valid")
});

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Characters of an ID shown in listings. Commands accept any unique prefix.
const SHORT_ID_LEN: usize = 8;

/// Parse a datetime string as either RFC 3339 or relative time.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
///
/// Relative times are measured back from `now`.
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Shortens an ID for display.
pub fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(end, _)| &id[..end])
}

/// Formats an instant in the given timezone as `YYYY-MM-DD HH:MM`.
pub fn format_instant<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Resolves project and task keys into a new entry for `actor`.
pub fn new_entry(
    db: &Database,
    actor: &UserId,
    project: &str,
    task: Option<&str>,
    description: Option<String>,
    category: Category,
) -> Result<(ProjectRecord, NewEntry)> {
    let project = db.find_project(actor, project)?;
    let task = task
        .map(|key| db.find_task(&project.id, key))
        .transpose()?
        .map(|task| task.id);
    let new = NewEntry::new(project.id.clone())
        .task(task)
        .description(description)
        .category(category);
    Ok((project, new))
}

/// Names of the projects visible to `actor`, with the tasks of each.
#[derive(Debug, Default)]
pub struct Names {
    projects: HashMap<ProjectId, String>,
    tasks: HashMap<TaskId, String>,
}

impl Names {
    pub fn load(db: &Database, actor: &UserId) -> Result<Self> {
        let mut names = Self::default();
        for project in db.list_projects(actor)? {
            for task in db.list_tasks(actor, &project.id)? {
                names.tasks.insert(task.id, task.name);
            }
            names.projects.insert(project.id, project.name);
        }
        Ok(names)
    }

    /// Project name, or the short ID when the project is not visible.
    pub fn project<'a>(&'a self, id: &'a ProjectId) -> &'a str {
        self.projects
            .get(id)
            .map_or_else(|| short_id(id.as_str()), String::as_str)
    }

    pub fn task<'a>(&'a self, id: &'a TaskId) -> &'a str {
        self.tasks
            .get(id)
            .map_or_else(|| short_id(id.as_str()), String::as_str)
    }
}
