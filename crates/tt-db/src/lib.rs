//! Storage layer for the time tracker.
//!
//! Provides persistence for projects, tasks, memberships and time entries
//! using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! This means a `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). A single fixed format keeps lexicographic
//! ordering equal to chronological ordering, which the range queries and the
//! `end_at >= start_at` check rely on.
//!
//! ## Derived Columns
//!
//! `time_entries.duration_minutes` and `time_entries.running` are maintained by
//! triggers:
//! - a row with `running = 0` and no `end_at` gets the current time as its end
//! - a row with an `end_at` is stopped and its duration derived from the interval
//! - a row without an `end_at` is running and has no duration
//!
//! The duration expression rounds whole milliseconds to the nearest minute,
//! exactly as [`tt_core::duration_minutes`] does.
//!
//! ## Single Running Timer
//!
//! A partial unique index allows at most one `running = 1` row per owner.

mod access;
mod entries;
mod report;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;
use tt_core::{
    Access, AuthError, Authorizer, Clock, EntryId, LifecycleError, ProjectId, SystemClock, TaskId,
    UserId, ValidationError,
};

pub use access::ProjectAccess;
pub use entries::SwitchOutcome;
pub use report::{DayTotal, ProjectTotal};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A lifecycle rule rejected the operation.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// A stored or supplied value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The referenced row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// A short key matched more than one row.
    #[error("{kind} prefix is ambiguous: {key}")]
    Ambiguous { kind: &'static str, key: String },
    /// A row with the same unique name already exists.
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },
    /// The owner already has an open entry.
    #[error("a timer is already running ({entry_id}); stop it first")]
    TimerAlreadyRunning { entry_id: EntryId },
    /// The task belongs to a different project than the entry.
    #[error("task {task} does not belong to project {project}")]
    TaskProjectMismatch { task: TaskId, project: ProjectId },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {id}: {timestamp}")]
    TimestampParse {
        id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl From<AuthError> for DbError {
    fn from(err: AuthError) -> Self {
        Self::Lifecycle(err.into())
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    clock: Box<dyn Clock>,
}

/// A project as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
}

/// A task as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub project: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        let db = Self {
            conn,
            clock: Box::new(SystemClock),
        };
        db.init()?;
        Ok(db)
    }

    /// Replaces the clock used for "now" in lifecycle operations.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the current instant from the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns the owner-or-member authorizer backed by this database.
    pub fn authorizer(&self) -> ProjectAccess<'_> {
        ProjectAccess::new(&self.conn)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (owner, name)
            );

            CREATE TABLE IF NOT EXISTS project_members (
                project_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (project_id, user_id),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_project_members_user ON project_members(user_id);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);

            -- Time entries: one row per timer run or manual entry
            -- start_at/end_at: ISO 8601 with milliseconds (e.g., '2024-01-15T10:30:00.000Z')
            -- duration_minutes/running: derived by the triggers below
            CREATE TABLE IF NOT EXISTS time_entries (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                project_id TEXT NOT NULL,
                task_id TEXT,
                category TEXT NOT NULL DEFAULT 'work'
                    CHECK (category IN ('work', 'study', 'break', 'custom')),
                description TEXT,
                start_at TEXT NOT NULL,
                end_at TEXT,
                duration_minutes INTEGER,
                running INTEGER NOT NULL DEFAULT 1 CHECK (running IN (0, 1)),
                CHECK (end_at IS NULL OR end_at >= start_at),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_time_entries_owner_start ON time_entries(owner, start_at);
            CREATE INDEX IF NOT EXISTS idx_time_entries_project ON time_entries(project_id);
            CREATE INDEX IF NOT EXISTS idx_time_entries_task ON time_entries(task_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_time_entries_one_running
                ON time_entries(owner) WHERE running = 1;

            CREATE TRIGGER IF NOT EXISTS time_entries_closed_immutable
            BEFORE UPDATE OF start_at, end_at, running ON time_entries
            WHEN OLD.running = 0 AND OLD.end_at IS NOT NULL
                AND (NEW.start_at IS NOT OLD.start_at
                     OR NEW.end_at IS NOT OLD.end_at
                     OR NEW.running IS NOT OLD.running)
            BEGIN
                SELECT RAISE(ABORT, 'stopped time entries cannot be reopened or retimed');
            END;

            CREATE TRIGGER IF NOT EXISTS time_entries_derive_insert
            AFTER INSERT ON time_entries
            BEGIN
                UPDATE time_entries
                SET end_at = COALESCE(
                    end_at,
                    CASE WHEN running = 0 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') END
                )
                WHERE id = NEW.id;
                UPDATE time_entries
                SET running = CASE WHEN end_at IS NULL THEN 1 ELSE 0 END,
                    duration_minutes = CASE
                        WHEN end_at IS NULL THEN NULL
                        ELSE (CAST(ROUND((julianday(end_at) - julianday(start_at)) * 86400000.0) AS INTEGER)
                              + 30000) / 60000
                    END
                WHERE id = NEW.id;
            END;

            CREATE TRIGGER IF NOT EXISTS time_entries_derive_update
            AFTER UPDATE OF start_at, end_at, running, duration_minutes ON time_entries
            BEGIN
                UPDATE time_entries
                SET end_at = COALESCE(
                    end_at,
                    CASE WHEN running = 0 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') END
                )
                WHERE id = NEW.id;
                UPDATE time_entries
                SET running = CASE WHEN end_at IS NULL THEN 1 ELSE 0 END,
                    duration_minutes = CASE
                        WHEN end_at IS NULL THEN NULL
                        ELSE (CAST(ROUND((julianday(end_at) - julianday(start_at)) * 86400000.0) AS INTEGER)
                              + 30000) / 60000
                    END
                WHERE id = NEW.id;
            END;
            ",
        )?;
        Ok(())
    }

    // ========== Projects ==========

    /// Creates a project owned by `owner`.
    pub fn create_project(&mut self, owner: &UserId, name: &str) -> Result<ProjectRecord, DbError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "project name",
            }
            .into());
        }
        let project = ProjectRecord {
            id: ProjectId::generate(),
            name: name.to_string(),
            owner: owner.clone(),
            created_at: self.clock.now(),
        };
        let result = self.conn.execute(
            "INSERT INTO projects (id, name, owner, created_at) VALUES (?, ?, ?, ?)",
            params![
                project.id.as_str(),
                project.name,
                project.owner.as_str(),
                format_timestamp(project.created_at),
            ],
        );
        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(DbError::AlreadyExists {
                    kind: "project",
                    name: project.name,
                });
            }
            Err(err) => return Err(err.into()),
        }
        tracing::info!(project = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// Lists projects the actor owns or is a member of, ordered by name.
    pub fn list_projects(&self, actor: &UserId) -> Result<Vec<ProjectRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT p.id, p.name, p.owner, p.created_at
            FROM projects p
            WHERE p.owner = ?1
               OR EXISTS (
                   SELECT 1 FROM project_members m
                   WHERE m.project_id = p.id AND m.user_id = ?1
               )
            ORDER BY p.name ASC, p.id ASC
            ",
        )?;
        let rows = stmt.query_map([actor.as_str()], raw_project)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?.into_record()?);
        }
        Ok(projects)
    }

    /// Finds a visible project by ID or name.
    ///
    /// An exact ID match wins, then a project the actor owns, then the
    /// oldest shared project with that name.
    pub fn find_project(&self, actor: &UserId, key: &str) -> Result<ProjectRecord, DbError> {
        let raw = self
            .conn
            .query_row(
                "
                SELECT p.id, p.name, p.owner, p.created_at
                FROM projects p
                WHERE (p.id = ?2 OR p.name = ?2)
                  AND (p.owner = ?1 OR EXISTS (
                      SELECT 1 FROM project_members m
                      WHERE m.project_id = p.id AND m.user_id = ?1
                  ))
                ORDER BY (p.id = ?2) DESC, (p.owner = ?1) DESC, p.created_at ASC
                LIMIT 1
                ",
                params![actor.as_str(), key],
                raw_project,
            )
            .optional()?;
        raw.ok_or_else(|| DbError::NotFound {
            kind: "project",
            id: key.to_string(),
        })?
        .into_record()
    }

    /// Deletes a project with its tasks, memberships and entries.
    pub fn delete_project(&mut self, actor: &UserId, project: &ProjectId) -> Result<(), DbError> {
        self.authorizer().check(actor, project, Access::Manage)?;
        self.conn
            .execute("DELETE FROM projects WHERE id = ?", [project.as_str()])?;
        tracing::info!(project = %project, "project deleted");
        Ok(())
    }

    /// Grants `member` access to a project. Only the owner may share.
    pub fn add_member(
        &mut self,
        actor: &UserId,
        project: &ProjectId,
        member: &UserId,
    ) -> Result<(), DbError> {
        self.authorizer().check(actor, project, Access::Manage)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)",
            params![project.as_str(), member.as_str()],
        )?;
        tracing::info!(project = %project, member = %member, "project shared");
        Ok(())
    }

    /// Lists users with member access to a project, ordered by name.
    pub fn list_members(&self, actor: &UserId, project: &ProjectId) -> Result<Vec<UserId>, DbError> {
        self.authorizer().check(actor, project, Access::Read)?;
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM project_members WHERE project_id = ? ORDER BY user_id ASC",
        )?;
        let rows = stmt.query_map([project.as_str()], |row| row.get::<_, String>(0))?;
        let mut members = Vec::new();
        for row in rows {
            members.push(UserId::new(row?)?);
        }
        Ok(members)
    }

    // ========== Tasks ==========

    /// Creates a task within a project.
    pub fn create_task(
        &mut self,
        actor: &UserId,
        project: &ProjectId,
        name: &str,
    ) -> Result<TaskRecord, DbError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty { field: "task name" }.into());
        }
        self.authorizer().check(actor, project, Access::Write)?;
        let task = TaskRecord {
            id: TaskId::generate(),
            project: project.clone(),
            name: name.to_string(),
            created_at: self.clock.now(),
        };
        self.conn.execute(
            "INSERT INTO tasks (id, project_id, name, created_at) VALUES (?, ?, ?, ?)",
            params![
                task.id.as_str(),
                task.project.as_str(),
                task.name,
                format_timestamp(task.created_at),
            ],
        )?;
        tracing::info!(task = %task.id, project = %project, "task created");
        Ok(task)
    }

    /// Lists the tasks of a project ordered by name.
    pub fn list_tasks(&self, actor: &UserId, project: &ProjectId) -> Result<Vec<TaskRecord>, DbError> {
        self.authorizer().check(actor, project, Access::Read)?;
        let mut stmt = self.conn.prepare(
            "
            SELECT id, project_id, name, created_at
            FROM tasks
            WHERE project_id = ?
            ORDER BY name ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([project.as_str()], raw_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_record()?);
        }
        Ok(tasks)
    }

    /// Finds a task in a project by ID or name.
    pub fn find_task(&self, project: &ProjectId, key: &str) -> Result<TaskRecord, DbError> {
        let raw = self
            .conn
            .query_row(
                "
                SELECT id, project_id, name, created_at
                FROM tasks
                WHERE project_id = ?1 AND (id = ?2 OR name = ?2)
                ORDER BY (id = ?2) DESC, created_at ASC
                LIMIT 1
                ",
                params![project.as_str(), key],
                raw_task,
            )
            .optional()?;
        raw.ok_or_else(|| DbError::NotFound {
            kind: "task",
            id: key.to_string(),
        })?
        .into_record()
    }

    /// Deletes a task. Entries that referenced it keep their project and lose the task.
    pub fn delete_task(&mut self, actor: &UserId, task: &TaskId) -> Result<(), DbError> {
        let project = task_project(&self.conn, task)?;
        self.authorizer().check(actor, &project, Access::Write)?;
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?", [task.as_str()])?;
        tracing::info!(task = %task, "task deleted");
        Ok(())
    }
}

#[derive(Debug)]
struct RawProject {
    id: String,
    name: String,
    owner: String,
    created_at: String,
}

impl RawProject {
    fn into_record(self) -> Result<ProjectRecord, DbError> {
        Ok(ProjectRecord {
            created_at: parse_timestamp(&self.created_at, &self.id)?,
            id: ProjectId::new(self.id)?,
            name: self.name,
            owner: UserId::new(self.owner)?,
        })
    }
}

fn raw_project(row: &Row<'_>) -> rusqlite::Result<RawProject> {
    Ok(RawProject {
        id: row.get(0)?,
        name: row.get(1)?,
        owner: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[derive(Debug)]
struct RawTask {
    id: String,
    project_id: String,
    name: String,
    created_at: String,
}

impl RawTask {
    fn into_record(self) -> Result<TaskRecord, DbError> {
        Ok(TaskRecord {
            created_at: parse_timestamp(&self.created_at, &self.id)?,
            id: TaskId::new(self.id)?,
            project: ProjectId::new(self.project_id)?,
            name: self.name,
        })
    }
}

fn raw_task(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Looks up the project a task belongs to.
fn task_project(conn: &Connection, task: &TaskId) -> Result<ProjectId, DbError> {
    let project: Option<String> = conn
        .query_row(
            "SELECT project_id FROM tasks WHERE id = ?",
            [task.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let project = project.ok_or_else(|| DbError::NotFound {
        kind: "task",
        id: task.to_string(),
    })?;
    Ok(ProjectId::new(project)?)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn parse_timestamp(timestamp: &str, id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
