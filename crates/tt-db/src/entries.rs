//! Time entry persistence.
//!
//! Every mutation runs the lifecycle inside an immediate transaction, with
//! [`ProjectAccess`] checking the actor against the same snapshot. Rows are
//! re-read after writing so callers always get the trigger-derived values.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tt_core::{
    Access, Authorizer, EntryEdit, EntryId, FixedClock, NewEntry, ProjectId, StopOutcome, TaskId,
    TimeEntry, TimeEntryLifecycle, TimeEntryRecord, UserId, ValidationError,
};

use crate::{
    Database, DbError, ProjectAccess, format_timestamp, is_unique_violation, parse_timestamp,
    task_project,
};

pub(crate) const ENTRY_COLUMNS: &str = "id, owner, project_id, task_id, category, description, start_at, end_at, duration_minutes, running";

/// Entries started and stopped by [`Database::switch_timer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub stopped: Option<TimeEntry>,
    pub started: TimeEntry,
}

impl Database {
    /// Starts a timer for `owner`.
    ///
    /// Fails with [`DbError::TimerAlreadyRunning`] when the owner already has
    /// an open entry.
    pub fn start_timer(&mut self, owner: &UserId, new: NewEntry) -> Result<TimeEntry, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        validate_task(&tx, &new)?;
        if let Some(running) = running_entry(&tx, owner)? {
            tracing::warn!(owner = %owner, running = %running.id(), "refusing to start a second timer");
            return Err(DbError::TimerAlreadyRunning {
                entry_id: running.id().clone(),
            });
        }

        let lifecycle = TimeEntryLifecycle::new(ProjectAccess::new(&tx), &self.clock);
        let entry = lifecycle.start(owner, new)?;
        insert_entry(&tx, &entry)?;
        let stored = load_entry(&tx, entry.id())?;
        tx.commit()?;

        tracing::info!(entry = %stored.id(), project = %stored.project(), "timer started");
        Ok(stored)
    }

    /// Stops the owner's running timer (if any) and starts a new one at the
    /// same instant.
    pub fn switch_timer(&mut self, owner: &UserId, new: NewEntry) -> Result<SwitchOutcome, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        validate_task(&tx, &new)?;

        let lifecycle =
            TimeEntryLifecycle::new(ProjectAccess::new(&tx), FixedClock::new(self.clock.now()));
        let stopped = match running_entry(&tx, owner)? {
            Some(running) => {
                let closed = lifecycle.stop(owner, &running, None)?.require_transition()?;
                close_entry(&tx, &closed)?;
                Some(load_entry(&tx, closed.id())?)
            }
            None => None,
        };
        let entry = lifecycle.start(owner, new)?;
        insert_entry(&tx, &entry)?;
        let started = load_entry(&tx, entry.id())?;
        tx.commit()?;

        tracing::info!(
            stopped = ?stopped.as_ref().map(TimeEntry::id),
            started = %started.id(),
            "timer switched"
        );
        Ok(SwitchOutcome { stopped, started })
    }

    /// Stops an entry, or the actor's running timer when `id` is `None`.
    ///
    /// `end` defaults to now. Stopping an entry that is already stopped
    /// returns [`StopOutcome::AlreadyStopped`] and writes nothing.
    pub fn stop_timer(
        &mut self,
        actor: &UserId,
        id: Option<&EntryId>,
        end: Option<DateTime<Utc>>,
    ) -> Result<StopOutcome, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entry = match id {
            Some(id) => load_entry(&tx, id)?,
            None => running_entry(&tx, actor)?.ok_or_else(|| DbError::NotFound {
                kind: "running timer",
                id: actor.to_string(),
            })?,
        };

        let lifecycle = TimeEntryLifecycle::new(ProjectAccess::new(&tx), &self.clock);
        let closed = match lifecycle.stop(actor, &entry, end)? {
            StopOutcome::Stopped(closed) => closed,
            unchanged @ StopOutcome::AlreadyStopped(_) => return Ok(unchanged),
        };
        close_entry(&tx, &closed)?;
        let stored = load_entry(&tx, closed.id())?;
        tx.commit()?;

        check_drift(&closed, &stored);
        tracing::info!(
            entry = %stored.id(),
            duration_minutes = ?stored.duration_minutes(),
            "timer stopped"
        );
        Ok(StopOutcome::Stopped(stored))
    }

    /// Closes the owner's open entry as if its running flag had been cleared.
    ///
    /// The end is taken from the database clock, so the result matches
    /// [`stop_timer`](Self::stop_timer) without an explicit end. Returns `None`
    /// when nothing was running.
    pub fn close_running_implicitly(&mut self, owner: &UserId) -> Result<Option<TimeEntry>, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(running) = running_entry(&tx, owner)? else {
            return Ok(None);
        };
        let lifecycle = TimeEntryLifecycle::new(ProjectAccess::new(&tx), &self.clock);
        let closed = lifecycle.close_implicit(owner, &running)?.require_transition()?;
        close_entry(&tx, &closed)?;
        let stored = load_entry(&tx, closed.id())?;
        tx.commit()?;

        check_drift(&closed, &stored);
        tracing::info!(
            entry = %stored.id(),
            duration_minutes = ?stored.duration_minutes(),
            "running timer closed"
        );
        Ok(Some(stored))
    }

    /// Records an entry that is already stopped.
    ///
    /// Nothing is written when `end` is before `start`.
    pub fn record_manual(
        &mut self,
        owner: &UserId,
        new: NewEntry,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeEntry, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        validate_task(&tx, &new)?;

        let lifecycle = TimeEntryLifecycle::new(ProjectAccess::new(&tx), &self.clock);
        let entry = lifecycle.record_manual(owner, new, start, end)?;
        insert_entry(&tx, &entry)?;
        let stored = load_entry(&tx, entry.id())?;
        tx.commit()?;

        check_drift(&entry, &stored);
        tracing::info!(
            entry = %stored.id(),
            duration_minutes = ?stored.duration_minutes(),
            "manual entry recorded"
        );
        Ok(stored)
    }

    /// Returns the owner's open entry, if any.
    pub fn running_entry(&self, owner: &UserId) -> Result<Option<TimeEntry>, DbError> {
        running_entry(&self.conn, owner)
    }

    /// Loads an entry the actor may read.
    pub fn get_entry(&self, actor: &UserId, id: &EntryId) -> Result<TimeEntry, DbError> {
        let entry = load_entry(&self.conn, id)?;
        self.authorizer()
            .check(actor, entry.project(), Access::Read)?;
        Ok(entry)
    }

    /// Finds one of the actor's entries by full ID or a unique ID prefix.
    pub fn find_entry(&self, actor: &UserId, key: &str) -> Result<TimeEntry, DbError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::Empty { field: "entry id" }.into());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT id FROM time_entries
            WHERE owner = ?1 AND (id = ?2 OR substr(id, 1, length(?2)) = ?2)
            ORDER BY (id = ?2) DESC
            LIMIT 2
            ",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![actor.as_str(), key], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        match ids.as_slice() {
            [] => Err(DbError::NotFound {
                kind: "time entry",
                id: key.to_string(),
            }),
            [only] => self.get_entry(actor, &EntryId::new(only.as_str())?),
            [first, _] if first == key => self.get_entry(actor, &EntryId::new(key)?),
            _ => Err(DbError::Ambiguous {
                kind: "time entry",
                key: key.to_string(),
            }),
        }
    }

    /// Lists the owner's entries ordered by start.
    ///
    /// With a range, only entries starting in `[start, end)` are returned.
    pub fn list_entries(
        &self,
        owner: &UserId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<TimeEntry>, DbError> {
        let (start, end) = match range {
            Some((start, end)) => (Some(format_timestamp(start)), Some(format_timestamp(end))),
            None => (None, None),
        };
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM time_entries
            WHERE owner = ?1
              AND (?2 IS NULL OR start_at >= ?2)
              AND (?3 IS NULL OR start_at < ?3)
            ORDER BY start_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params![owner.as_str(), start, end], raw_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Lists the entries of a project the actor may read.
    pub fn list_project_entries(
        &self,
        actor: &UserId,
        project: &ProjectId,
    ) -> Result<Vec<TimeEntry>, DbError> {
        self.authorizer().check(actor, project, Access::Read)?;
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM time_entries
            WHERE project_id = ?
            ORDER BY start_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map([project.as_str()], raw_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Updates description or category. Timing and state are untouched.
    pub fn edit_entry(
        &mut self,
        actor: &UserId,
        id: &EntryId,
        edit: &EntryEdit,
    ) -> Result<TimeEntry, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entry = load_entry(&tx, id)?;
        let lifecycle = TimeEntryLifecycle::new(ProjectAccess::new(&tx), &self.clock);
        let edited = lifecycle.edit(actor, &entry, edit)?;
        tx.execute(
            "UPDATE time_entries SET description = ?, category = ? WHERE id = ?",
            params![
                edited.description(),
                edited.category().as_str(),
                edited.id().as_str()
            ],
        )?;
        let stored = load_entry(&tx, id)?;
        tx.commit()?;
        tracing::info!(entry = %stored.id(), "entry edited");
        Ok(stored)
    }

    /// Deletes an entry.
    pub fn delete_entry(&mut self, actor: &UserId, id: &EntryId) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        let entry = load_entry(&tx, id)?;
        ProjectAccess::new(&tx).check(actor, entry.project(), Access::Write)?;
        tx.execute("DELETE FROM time_entries WHERE id = ?", [id.as_str()])?;
        tx.commit()?;
        tracing::info!(entry = %id, "entry deleted");
        Ok(())
    }
}

/// Rejects a task that is missing or belongs to another project.
fn validate_task(conn: &Connection, new: &NewEntry) -> Result<(), DbError> {
    let Some(task) = &new.task else {
        return Ok(());
    };
    let project = task_project(conn, task)?;
    if project != new.project {
        return Err(DbError::TaskProjectMismatch {
            task: task.clone(),
            project: new.project.clone(),
        });
    }
    Ok(())
}

fn insert_entry(conn: &Connection, entry: &TimeEntry) -> Result<(), DbError> {
    let result = conn.execute(
        "
        INSERT INTO time_entries
        (id, owner, project_id, task_id, category, description, start_at, end_at, running)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            entry.id().as_str(),
            entry.owner().as_str(),
            entry.project().as_str(),
            entry.task().map(TaskId::as_str),
            entry.category().as_str(),
            entry.description(),
            format_timestamp(entry.start()),
            entry.end().map(format_timestamp),
            entry.is_running(),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(err) if entry.is_running() && is_unique_violation(&err) => {
            match running_entry(conn, entry.owner())? {
                Some(running) => Err(DbError::TimerAlreadyRunning {
                    entry_id: running.id().clone(),
                }),
                None => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes the end instant of a closed entry; the trigger derives the rest.
fn close_entry(conn: &Connection, closed: &TimeEntry) -> Result<(), DbError> {
    conn.execute(
        "UPDATE time_entries SET end_at = ?, running = 0 WHERE id = ? AND running = 1",
        params![closed.end().map(format_timestamp), closed.id().as_str()],
    )?;
    Ok(())
}

fn load_entry(conn: &Connection, id: &EntryId) -> Result<TimeEntry, DbError> {
    let raw = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?"),
            [id.as_str()],
            raw_entry,
        )
        .optional()?;
    raw.ok_or_else(|| DbError::NotFound {
        kind: "time entry",
        id: id.to_string(),
    })?
    .into_entry()
}

fn running_entry(conn: &Connection, owner: &UserId) -> Result<Option<TimeEntry>, DbError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE owner = ? AND running = 1 LIMIT 1"
            ),
            [owner.as_str()],
            raw_entry,
        )
        .optional()?;
    raw.map(RawEntry::into_entry).transpose()
}

fn check_drift(predicted: &TimeEntry, stored: &TimeEntry) {
    if predicted.duration_minutes() != stored.duration_minutes() {
        tracing::warn!(
            entry = %stored.id(),
            predicted = ?predicted.duration_minutes(),
            stored = ?stored.duration_minutes(),
            "stored duration differs from lifecycle prediction"
        );
    }
}

#[derive(Debug)]
pub(crate) struct RawEntry {
    id: String,
    owner: String,
    project_id: String,
    task_id: Option<String>,
    category: String,
    description: Option<String>,
    start_at: String,
    end_at: Option<String>,
    duration_minutes: Option<i64>,
    running: bool,
}

impl RawEntry {
    pub(crate) fn into_entry(self) -> Result<TimeEntry, DbError> {
        let start = parse_timestamp(&self.start_at, &self.id)?;
        let end = self
            .end_at
            .as_deref()
            .map(|end| parse_timestamp(end, &self.id))
            .transpose()?;
        let record = TimeEntryRecord {
            id: EntryId::new(self.id)?,
            owner: UserId::new(self.owner)?,
            project: ProjectId::new(self.project_id)?,
            task: self.task_id.map(TaskId::new).transpose()?,
            category: self.category.parse()?,
            description: self.description,
            start,
            end,
            duration_minutes: self.duration_minutes,
            running: self.running,
        };
        Ok(TimeEntry::try_from(record)?)
    }
}

pub(crate) fn raw_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        owner: row.get(1)?,
        project_id: row.get(2)?,
        task_id: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        start_at: row.get(6)?,
        end_at: row.get(7)?,
        duration_minutes: row.get(8)?,
        running: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use tt_core::{AuthError, Category, EntryState, LifecycleError, duration_minutes};

    use crate::tests::user;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    /// A database whose clock is frozen at `now`, with one project owned by ana.
    fn setup(now: DateTime<Utc>) -> (Database, ProjectId) {
        let mut db = Database::open_in_memory()
            .unwrap()
            .with_clock(FixedClock::new(now));
        let project = db.create_project(&user("ana"), "Website").unwrap();
        (db, project.id)
    }

    fn count_entries(db: &Database) -> i64 {
        db.conn
            .query_row("SELECT COUNT(*) FROM time_entries", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn start_persists_open_entry() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");

        let entry = db
            .start_timer(
                &ana,
                NewEntry::new(project.clone())
                    .description(Some("landing page".to_string()))
                    .category(Category::Work),
            )
            .unwrap();

        assert!(entry.is_running());
        assert_eq!(entry.end(), None);
        assert_eq!(entry.duration_minutes(), None);
        assert_eq!(entry.start(), at(9, 0, 0));
        assert_eq!(db.running_entry(&ana).unwrap(), Some(entry.clone()));
        assert_eq!(db.get_entry(&ana, entry.id()).unwrap(), entry);
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let first = db.start_timer(&ana, NewEntry::new(project.clone())).unwrap();

        let err = db.start_timer(&ana, NewEntry::new(project)).unwrap_err();

        match err {
            DbError::TimerAlreadyRunning { entry_id } => assert_eq!(&entry_id, first.id()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(count_entries(&db), 1);
    }

    #[test]
    fn unique_index_backs_up_single_timer_rule() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let first = db.start_timer(&ana, NewEntry::new(project.clone())).unwrap();

        // Bypass the lookup to simulate a racing writer.
        let lifecycle = TimeEntryLifecycle::new(tt_core::AllowAll, FixedClock::new(at(9, 1, 0)));
        let racing = lifecycle.start(&ana, NewEntry::new(project)).unwrap();
        let err = insert_entry(&db.conn, &racing).unwrap_err();

        match err {
            DbError::TimerAlreadyRunning { entry_id } => assert_eq!(&entry_id, first.id()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn different_owners_may_run_concurrently() {
        let (mut db, project) = setup(at(9, 0, 0));
        let (ana, ben) = (user("ana"), user("ben"));
        db.add_member(&ana, &project, &ben).unwrap();

        db.start_timer(&ana, NewEntry::new(project.clone())).unwrap();
        db.start_timer(&ben, NewEntry::new(project)).unwrap();
    }

    #[test]
    fn start_then_stop_ninety_minutes() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let entry = db.start_timer(&ana, NewEntry::new(project)).unwrap();

        let mut db = db.with_clock(FixedClock::new(at(10, 30, 0)));
        let outcome = db.stop_timer(&ana, None, None).unwrap();

        assert!(outcome.is_transition());
        let stopped = outcome.into_entry();
        assert_eq!(stopped.id(), entry.id());
        assert!(!stopped.is_running());
        assert_eq!(stopped.end(), Some(at(10, 30, 0)));
        assert_eq!(stopped.duration_minutes(), Some(90));
        assert_eq!(db.running_entry(&ana).unwrap(), None);
    }

    #[test]
    fn stop_with_explicit_end() {
        let (mut db, project) = setup(at(12, 0, 0));
        let ana = user("ana");
        let entry = db.start_timer(&ana, NewEntry::new(project)).unwrap();

        let stopped = db
            .stop_timer(&ana, Some(entry.id()), Some(at(12, 44, 30)))
            .unwrap()
            .into_entry();

        assert_eq!(stopped.duration_minutes(), Some(45));
    }

    #[test]
    fn stop_before_start_is_rejected_and_entry_stays_open() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let entry = db.start_timer(&ana, NewEntry::new(project)).unwrap();

        let err = db
            .stop_timer(&ana, Some(entry.id()), Some(at(8, 0, 0)))
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Lifecycle(LifecycleError::InvalidRange { .. })
        ));
        assert!(db.get_entry(&ana, entry.id()).unwrap().is_running());
    }

    #[test]
    fn stop_twice_returns_unchanged_entry() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let entry = db.start_timer(&ana, NewEntry::new(project)).unwrap();
        let mut db = db.with_clock(FixedClock::new(at(10, 0, 0)));
        let first = db.stop_timer(&ana, Some(entry.id()), None).unwrap().into_entry();

        let mut db = db.with_clock(FixedClock::new(at(15, 0, 0)));
        let second = db.stop_timer(&ana, Some(entry.id()), None).unwrap();

        assert!(!second.is_transition());
        assert_eq!(second.entry(), &first);
        assert_eq!(db.get_entry(&ana, entry.id()).unwrap(), first);
    }

    #[test]
    fn stop_without_running_timer_is_not_found() {
        let (mut db, _) = setup(at(9, 0, 0));
        let err = db.stop_timer(&user("ana"), None, None).unwrap_err();
        assert_eq!(err.to_string(), "running timer not found: ana");
    }

    #[test]
    fn stop_unknown_entry_is_not_found() {
        let (mut db, _) = setup(at(9, 0, 0));
        let missing = EntryId::new("missing").unwrap();
        let err = db.stop_timer(&user("ana"), Some(&missing), None).unwrap_err();
        assert!(matches!(err, DbError::NotFound { kind: "time entry", .. }));
    }

    #[test]
    fn stranger_cannot_stop_entry() {
        let (mut db, project) = setup(at(9, 0, 0));
        let entry = db.start_timer(&user("ana"), NewEntry::new(project)).unwrap();

        let err = db
            .stop_timer(&user("mallory"), Some(entry.id()), None)
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Lifecycle(LifecycleError::Unauthorized(AuthError::Denied { .. }))
        ));
        assert!(db.running_entry(&user("ana")).unwrap().is_some());
    }

    #[test]
    fn switch_closes_and_opens_at_same_instant() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let first = db.start_timer(&ana, NewEntry::new(project.clone())).unwrap();

        let mut db = db.with_clock(FixedClock::new(at(9, 25, 0)));
        let outcome = db
            .switch_timer(&ana, NewEntry::new(project).category(Category::Break))
            .unwrap();

        let stopped = outcome.stopped.unwrap();
        assert_eq!(stopped.id(), first.id());
        assert_eq!(stopped.end(), Some(at(9, 25, 0)));
        assert_eq!(outcome.started.start(), at(9, 25, 0));
        assert_eq!(outcome.started.category(), Category::Break);
        assert_eq!(db.running_entry(&ana).unwrap(), Some(outcome.started));
    }

    #[test]
    fn switch_without_running_timer_just_starts() {
        let (mut db, project) = setup(at(9, 0, 0));
        let outcome = db.switch_timer(&user("ana"), NewEntry::new(project)).unwrap();
        assert!(outcome.stopped.is_none());
        assert!(outcome.started.is_running());
    }

    #[test]
    fn manual_entry_forty_five_minutes() {
        let (mut db, project) = setup(at(12, 0, 0));
        let entry = db
            .record_manual(&user("ana"), NewEntry::new(project), at(9, 0, 0), at(9, 45, 0))
            .unwrap();

        assert!(!entry.is_running());
        assert_eq!(entry.duration_minutes(), Some(45));
    }

    #[test]
    fn manual_entry_with_reversed_range_persists_nothing() {
        let (mut db, project) = setup(at(12, 0, 0));
        let err = db
            .record_manual(&user("ana"), NewEntry::new(project), at(10, 0, 0), at(9, 0, 0))
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Lifecycle(LifecycleError::InvalidRange { .. })
        ));
        assert_eq!(count_entries(&db), 0);
    }

    #[test]
    fn manual_entry_does_not_touch_running_timer() {
        let (mut db, project) = setup(at(12, 0, 0));
        let ana = user("ana");
        let running = db.start_timer(&ana, NewEntry::new(project.clone())).unwrap();
        db.record_manual(&ana, NewEntry::new(project), at(9, 0, 0), at(9, 45, 0))
            .unwrap();
        assert_eq!(db.running_entry(&ana).unwrap(), Some(running));
    }

    #[test]
    fn task_must_belong_to_project() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let other = db.create_project(&ana, "Homework").unwrap();
        let task = db.create_task(&ana, &other.id, "Essay").unwrap();

        let err = db
            .start_timer(&ana, NewEntry::new(project).task(Some(task.id.clone())))
            .unwrap_err();
        assert!(matches!(err, DbError::TaskProjectMismatch { .. }));

        let entry = db
            .start_timer(&ana, NewEntry::new(other.id).task(Some(task.id.clone())))
            .unwrap();
        assert_eq!(entry.task(), Some(&task.id));
    }

    #[test]
    fn implicit_close_uses_database_clock() {
        let (mut db, project) = setup(at(9, 0, 0));
        let ana = user("ana");
        let entry = db.start_timer(&ana, NewEntry::new(project)).unwrap();

        db = db.with_clock(FixedClock::new(at(10, 30, 0)));
        let closed = db.close_running_implicitly(&ana).unwrap().unwrap();

        assert_eq!(closed.id(), entry.id());
        assert!(!closed.is_running());
        assert_eq!(closed.end(), Some(at(10, 30, 0)));
        assert_eq!(closed.duration_minutes(), Some(90));
        assert!(db.close_running_implicitly(&ana).unwrap().is_none());
    }

    #[test]
    fn implicit_and_explicit_close_agree_under_fixed_clock() {
        let ana = user("ana");
        let mut closed = Vec::new();
        for implicit in [true, false] {
            let (mut db, project) = setup(at(9, 0, 0));
            db.start_timer(&ana, NewEntry::new(project)).unwrap();
            db = db.with_clock(FixedClock::new(at(9, 44, 31)));
            let entry = if implicit {
                db.close_running_implicitly(&ana).unwrap().unwrap()
            } else {
                db.stop_timer(&ana, None, None).unwrap().into_entry()
            };
            closed.push((entry.end(), entry.duration_minutes()));
        }
        assert_eq!(closed[0], closed[1]);
        assert_eq!(closed[0], (Some(at(9, 44, 31)), Some(45)));
    }

    #[test]
    fn edit_changes_only_description_and_category() {
        let (mut db, project) = setup(at(12, 0, 0));
        let ana = user("ana");
        let entry = db
            .record_manual(&ana, NewEntry::new(project), at(9, 0, 0), at(9, 45, 0))
            .unwrap();

        let edited = db
            .edit_entry(
                &ana,
                entry.id(),
                &EntryEdit {
                    description: Some("retro".to_string()),
                    category: Some(Category::Study),
                },
            )
            .unwrap();

        assert_eq!(edited.description(), Some("retro"));
        assert_eq!(edited.category(), Category::Study);
        assert_eq!(edited.state(), entry.state());
    }

    #[test]
    fn delete_entry_requires_access() {
        let (mut db, project) = setup(at(12, 0, 0));
        let ana = user("ana");
        let entry = db
            .record_manual(&ana, NewEntry::new(project), at(9, 0, 0), at(9, 45, 0))
            .unwrap();

        assert!(db.delete_entry(&user("ben"), entry.id()).is_err());
        db.delete_entry(&ana, entry.id()).unwrap();
        assert!(matches!(
            db.get_entry(&ana, entry.id()),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn list_entries_filters_by_range() {
        let (mut db, project) = setup(at(18, 0, 0));
        let ana = user("ana");
        for (start, end) in [(8, 9), (10, 11), (13, 14)] {
            db.record_manual(
                &ana,
                NewEntry::new(project.clone()),
                at(start, 0, 0),
                at(end, 0, 0),
            )
            .unwrap();
        }

        assert_eq!(db.list_entries(&ana, None).unwrap().len(), 3);
        let ranged = db
            .list_entries(&ana, Some((at(10, 0, 0), at(13, 0, 0))))
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].start(), at(10, 0, 0));
        assert!(db.list_entries(&user("ben"), None).unwrap().is_empty());
    }

    #[test]
    fn find_entry_by_id_or_unique_prefix() {
        let (mut db, project) = setup(at(18, 0, 0));
        let ana = user("ana");
        let entry = db
            .record_manual(&ana, NewEntry::new(project), at(8, 0, 0), at(9, 0, 0))
            .unwrap();
        let id = entry.id().as_str();

        assert_eq!(db.find_entry(&ana, id).unwrap(), entry);
        assert_eq!(db.find_entry(&ana, &id[..8]).unwrap(), entry);
        assert!(matches!(
            db.find_entry(&ana, "zzz"),
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            db.find_entry(&user("ben"), id),
            Err(DbError::NotFound { .. })
        ));
        assert!(db.find_entry(&ana, " ").is_err());
    }

    #[test]
    fn find_entry_rejects_ambiguous_prefix() {
        let (db, project) = setup(at(18, 0, 0));
        let ana = user("ana");
        for id in ["abc-1", "abc-2"] {
            db.conn
                .execute(
                    "INSERT INTO time_entries (id, owner, project_id, start_at, end_at) VALUES (?, ?, ?, ?, ?)",
                    params![
                        id,
                        ana.as_str(),
                        project.as_str(),
                        "2024-01-01T08:00:00.000Z",
                        "2024-01-01T09:00:00.000Z"
                    ],
                )
                .unwrap();
        }

        assert!(matches!(
            db.find_entry(&ana, "abc"),
            Err(DbError::Ambiguous { .. })
        ));
        assert_eq!(db.find_entry(&ana, "abc-2").unwrap().id().as_str(), "abc-2");
    }

    #[test]
    fn members_see_project_entries() {
        let (mut db, project) = setup(at(18, 0, 0));
        let (ana, ben) = (user("ana"), user("ben"));
        db.record_manual(&ana, NewEntry::new(project.clone()), at(8, 0, 0), at(9, 0, 0))
            .unwrap();

        assert!(db.list_project_entries(&ben, &project).is_err());
        db.add_member(&ana, &project, &ben).unwrap();
        assert_eq!(db.list_project_entries(&ben, &project).unwrap().len(), 1);
    }

    // ========== Foreign Key Policy ==========

    #[test]
    fn deleting_task_clears_entry_task() {
        let (mut db, project) = setup(at(12, 0, 0));
        let ana = user("ana");
        let task = db.create_task(&ana, &project, "Design").unwrap();
        let entry = db
            .record_manual(
                &ana,
                NewEntry::new(project).task(Some(task.id.clone())),
                at(9, 0, 0),
                at(9, 45, 0),
            )
            .unwrap();

        db.delete_task(&ana, &task.id).unwrap();

        let reloaded = db.get_entry(&ana, entry.id()).unwrap();
        assert_eq!(reloaded.task(), None);
        assert_eq!(reloaded.duration_minutes(), Some(45));
    }

    #[test]
    fn deleting_project_removes_entries() {
        let (mut db, project) = setup(at(12, 0, 0));
        let ana = user("ana");
        db.record_manual(&ana, NewEntry::new(project.clone()), at(9, 0, 0), at(9, 45, 0))
            .unwrap();
        db.start_timer(&ana, NewEntry::new(project.clone())).unwrap();

        db.delete_project(&ana, &project).unwrap();

        assert_eq!(count_entries(&db), 0);
        assert_eq!(db.running_entry(&ana).unwrap(), None);
    }

    // ========== Trigger Tests ==========

    fn insert_raw(db: &Database, id: &str, start: &str, end: Option<&str>, running: bool) {
        db.conn
            .execute(
                "
                INSERT INTO time_entries (id, owner, project_id, start_at, end_at, running)
                SELECT ?, 'ana', id, ?, ?, ? FROM projects LIMIT 1
                ",
                params![id, start, end, running],
            )
            .unwrap();
    }

    fn stored_duration(db: &Database, id: &str) -> Option<i64> {
        db.conn
            .query_row(
                "SELECT duration_minutes FROM time_entries WHERE id = ?",
                [id],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn trigger_derives_duration_and_running_on_insert() {
        let (db, _) = setup(at(12, 0, 0));
        insert_raw(
            &db,
            "closed",
            "2024-01-01T09:00:00.000Z",
            Some("2024-01-01T10:30:00.000Z"),
            true,
        );
        let entry = load_entry(&db.conn, &EntryId::new("closed").unwrap()).unwrap();
        assert!(!entry.is_running());
        assert_eq!(entry.duration_minutes(), Some(90));

        insert_raw(&db, "open", "2024-01-01T11:00:00.000Z", None, true);
        assert_eq!(stored_duration(&db, "open"), None);
    }

    #[test]
    fn trigger_fills_end_when_running_cleared_without_end() {
        let (db, _) = setup(at(12, 0, 0));
        let start = format_timestamp(Utc::now() - Duration::minutes(30));
        insert_raw(&db, "e1", &start, None, true);

        db.conn
            .execute("UPDATE time_entries SET running = 0 WHERE id = 'e1'", [])
            .unwrap();

        let entry = load_entry(&db.conn, &EntryId::new("e1").unwrap()).unwrap();
        assert!(entry.end().is_some());
        assert!((29..=31).contains(&entry.duration_minutes().unwrap()));
    }

    #[test]
    fn trigger_overrides_independently_set_duration() {
        let (db, _) = setup(at(12, 0, 0));
        insert_raw(
            &db,
            "e1",
            "2024-01-01T09:00:00.000Z",
            Some("2024-01-01T09:45:00.000Z"),
            false,
        );

        db.conn
            .execute(
                "UPDATE time_entries SET duration_minutes = 999 WHERE id = 'e1'",
                [],
            )
            .unwrap();

        assert_eq!(stored_duration(&db, "e1"), Some(45));
    }

    #[test]
    fn stopped_rows_cannot_be_reopened_or_retimed() {
        let (db, _) = setup(at(12, 0, 0));
        insert_raw(
            &db,
            "e1",
            "2024-01-01T09:00:00.000Z",
            Some("2024-01-01T09:45:00.000Z"),
            false,
        );

        assert!(
            db.conn
                .execute("UPDATE time_entries SET running = 1 WHERE id = 'e1'", [])
                .is_err()
        );
        assert!(
            db.conn
                .execute(
                    "UPDATE time_entries SET end_at = '2024-01-01T11:00:00.000Z' WHERE id = 'e1'",
                    [],
                )
                .is_err()
        );
        assert_eq!(stored_duration(&db, "e1"), Some(45));
    }

    #[test]
    fn reversed_interval_violates_check() {
        let (db, _) = setup(at(12, 0, 0));
        let result = db.conn.execute(
            "
            INSERT INTO time_entries (id, owner, project_id, start_at, end_at, running)
            SELECT 'bad', 'ana', id, '2024-01-01T10:00:00.000Z', '2024-01-01T09:00:00.000Z', 0
            FROM projects LIMIT 1
            ",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn trigger_matches_lifecycle_at_half_minute_boundaries() {
        let (db, _) = setup(at(12, 0, 0));
        let start = at(9, 0, 0);
        for (i, elapsed_ms) in [0, 29_999, 30_000, 30_001, 89_999, 90_000, 5_400_000]
            .into_iter()
            .enumerate()
        {
            let id = format!("e{i}");
            let end = start + Duration::milliseconds(elapsed_ms);
            insert_raw(
                &db,
                &id,
                &format_timestamp(start),
                Some(&format_timestamp(end)),
                false,
            );
            assert_eq!(
                stored_duration(&db, &id),
                duration_minutes(start, end),
                "elapsed {elapsed_ms}ms"
            );
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn trigger_and_lifecycle_agree(
            start_ms in 0i64..(3 * 365 * 86_400_000),
            elapsed_ms in 0i64..(30 * 86_400_000),
        ) {
            let (mut db, project) = setup(at(0, 0, 0));
            let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
                + Duration::milliseconds(start_ms);
            let end = start + Duration::milliseconds(elapsed_ms);

            let stored = db
                .record_manual(&user("ana"), NewEntry::new(project), start, end)
                .unwrap();

            prop_assert_eq!(stored.duration_minutes(), duration_minutes(start, end));
            prop_assert_eq!(
                stored.state(),
                EntryState::Closed { end, duration_minutes: (elapsed_ms + 30_000) / 60_000 }
            );
        }
    }
}
