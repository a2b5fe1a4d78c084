//! Read-only totals over stopped entries.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tt_core::{ProjectId, UserId};

use crate::entries::{ENTRY_COLUMNS, raw_entry};
use crate::{Database, DbError, format_timestamp};

/// Minutes logged against one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTotal {
    pub project: ProjectId,
    pub name: String,
    pub minutes: i64,
    pub entries: i64,
}

/// Minutes logged on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayTotal {
    pub day: NaiveDate,
    pub minutes: i64,
}

impl Database {
    /// Sums stopped entries per project for entries starting in `[start, end)`.
    ///
    /// Ordered by total descending, then project name.
    pub fn project_totals(
        &self,
        owner: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ProjectTotal>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT p.id, p.name, SUM(e.duration_minutes) AS minutes, COUNT(*) AS entries
            FROM time_entries e
            JOIN projects p ON p.id = e.project_id
            WHERE e.owner = ? AND e.running = 0 AND e.start_at >= ? AND e.start_at < ?
            GROUP BY p.id, p.name
            ORDER BY minutes DESC, p.name ASC
            ",
        )?;
        let rows = stmt.query_map(
            [
                owner.as_str().to_string(),
                format_timestamp(start),
                format_timestamp(end),
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;
        let mut totals = Vec::new();
        for row in rows {
            let (project, name, minutes, entries) = row?;
            totals.push(ProjectTotal {
                project: ProjectId::new(project)?,
                name,
                minutes,
                entries,
            });
        }
        Ok(totals)
    }

    /// Sums stopped entries per day, with days taken in `tz`.
    ///
    /// An entry counts towards the day it started on.
    pub fn daily_totals<Tz: TimeZone>(
        &self,
        owner: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<Vec<DayTotal>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM time_entries
            WHERE owner = ? AND running = 0 AND start_at >= ? AND start_at < ?
            "
        ))?;
        let rows = stmt.query_map(
            [
                owner.as_str().to_string(),
                format_timestamp(start),
                format_timestamp(end),
            ],
            raw_entry,
        )?;
        let mut by_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for row in rows {
            let entry = row?.into_entry()?;
            let day = entry.start().with_timezone(tz).date_naive();
            *by_day.entry(day).or_default() += entry.duration_minutes().unwrap_or(0);
        }
        Ok(by_day
            .into_iter()
            .map(|(day, minutes)| DayTotal { day, minutes })
            .collect())
    }
}
