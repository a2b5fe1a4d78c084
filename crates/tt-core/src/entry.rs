//! Time entries and their open/closed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::{duration_minutes, to_storage_precision};
use crate::types::{Category, EntryId, ProjectId, TaskId, UserId, ValidationError};

/// Whether an entry's timer is still running.
///
/// An open entry has no end and no duration; a closed entry always has
/// both, with the duration derived from the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Open,
    Closed {
        end: DateTime<Utc>,
        duration_minutes: i64,
    },
}

/// A recorded span of time against a project.
///
/// Fields are private so that the running flag, end instant and duration
/// can only change through the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeEntryRecord", into = "TimeEntryRecord")]
pub struct TimeEntry {
    id: EntryId,
    owner: UserId,
    project: ProjectId,
    task: Option<TaskId>,
    category: Category,
    description: Option<String>,
    start: DateTime<Utc>,
    state: EntryState,
}

/// Flat representation of a time entry, as stored and serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntryRecord {
    pub id: EntryId,
    pub owner: UserId,
    pub project: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub running: bool,
}

/// Fields shared by every newly created entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub project: ProjectId,
    pub task: Option<TaskId>,
    pub description: Option<String>,
    pub category: Category,
}

impl NewEntry {
    #[must_use]
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            task: None,
            description: None,
            category: Category::default(),
        }
    }

    #[must_use]
    pub fn task(mut self, task: Option<TaskId>) -> Self {
        self.task = task;
        self
    }

    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = crate::types::normalize_text(description);
        self
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// Changes allowed on an entry without affecting its timing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryEdit {
    /// `Some("")` clears the description.
    pub description: Option<String>,
    pub category: Option<Category>,
}

impl EntryEdit {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.description.is_none() && self.category.is_none()
    }
}

impl TimeEntry {
    pub(crate) fn new(
        id: EntryId,
        owner: UserId,
        new: NewEntry,
        start: DateTime<Utc>,
        state: EntryState,
    ) -> Self {
        Self {
            id,
            owner,
            project: new.project,
            task: new.task,
            category: new.category,
            description: crate::types::normalize_text(new.description),
            start: to_storage_precision(start),
            state,
        }
    }

    /// Returns a closed copy of this entry, or `None` if `end` precedes start.
    pub(crate) fn closed_at(&self, end: DateTime<Utc>) -> Option<Self> {
        let end = to_storage_precision(end);
        let duration_minutes = duration_minutes(self.start, end)?;
        Some(Self {
            state: EntryState::Closed {
                end,
                duration_minutes,
            },
            ..self.clone()
        })
    }

    pub(crate) fn edited(&self, edit: &EntryEdit) -> Self {
        let mut entry = self.clone();
        if let Some(description) = &edit.description {
            entry.description = crate::types::normalize_text(Some(description.clone()));
        }
        if let Some(category) = edit.category {
            entry.category = category;
        }
        entry
    }

    pub const fn id(&self) -> &EntryId {
        &self.id
    }

    pub const fn owner(&self) -> &UserId {
        &self.owner
    }

    pub const fn project(&self) -> &ProjectId {
        &self.project
    }

    pub const fn task(&self) -> Option<&TaskId> {
        self.task.as_ref()
    }

    pub const fn category(&self) -> Category {
        self.category
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn state(&self) -> EntryState {
        self.state
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, EntryState::Open)
    }

    pub const fn end(&self) -> Option<DateTime<Utc>> {
        match self.state {
            EntryState::Open => None,
            EntryState::Closed { end, .. } => Some(end),
        }
    }

    pub const fn duration_minutes(&self) -> Option<i64> {
        match self.state {
            EntryState::Open => None,
            EntryState::Closed {
                duration_minutes, ..
            } => Some(duration_minutes),
        }
    }

    /// Minutes elapsed so far, for display.
    ///
    /// Closed entries report their stored duration. Open entries are measured
    /// against `now` with the same rounding rule; a `now` before start counts
    /// as zero. Never mutates the entry.
    #[must_use]
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.duration_minutes()
            .unwrap_or_else(|| duration_minutes(self.start, now).unwrap_or(0))
    }
}

impl From<TimeEntry> for TimeEntryRecord {
    fn from(entry: TimeEntry) -> Self {
        let end = entry.end();
        let duration_minutes = entry.duration_minutes();
        Self {
            running: entry.is_running(),
            id: entry.id,
            owner: entry.owner,
            project: entry.project,
            task: entry.task,
            category: entry.category,
            description: entry.description,
            start: entry.start,
            end,
            duration_minutes,
        }
    }
}

impl TryFrom<TimeEntryRecord> for TimeEntry {
    type Error = ValidationError;

    fn try_from(record: TimeEntryRecord) -> Result<Self, Self::Error> {
        let inconsistent = |reason| ValidationError::InconsistentEntry {
            id: record.id.to_string(),
            reason,
        };
        let start = to_storage_precision(record.start);
        let state = match (record.running, record.end, record.duration_minutes) {
            (true, None, None) => EntryState::Open,
            (true, _, _) => return Err(inconsistent("running entry has an end or duration")),
            (false, Some(end), Some(stored)) => {
                let end = to_storage_precision(end);
                let derived = duration_minutes(start, end)
                    .ok_or_else(|| inconsistent("end is before start"))?;
                if derived != stored {
                    return Err(inconsistent("duration does not match start and end"));
                }
                EntryState::Closed {
                    end,
                    duration_minutes: stored,
                }
            }
            (false, _, _) => return Err(inconsistent("stopped entry is missing end or duration")),
        };
        Ok(Self {
            id: record.id,
            owner: record.owner,
            project: record.project,
            task: record.task,
            category: record.category,
            description: record.description,
            start,
            state,
        })
    }
}
