//! Time entry lifecycle: start, stop, manual entry.
//!
//! # State Machine
//!
//! ```text
//! start ──▶ Open ──stop──▶ Closed ◀── record_manual
//! ```
//!
//! `Closed` is terminal. Stopping a closed entry is a no-op that returns the
//! entry unchanged; it never recomputes the duration from a new "now".
//!
//! The lifecycle does not scan for other running entries. Keeping a single
//! open entry per owner is the job of the persistence layer, which looks up
//! the running entry inside the same transaction as the insert.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::{Access, AuthError, Authorizer};
use crate::clock::{Clock, SystemClock};
use crate::duration::to_storage_precision;
use crate::entry::{EntryEdit, EntryState, NewEntry, TimeEntry};
use crate::types::{EntryId, UserId};

/// Errors raised by lifecycle operations.
///
/// All of them are recoverable and meant to be shown to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The interval ends before it starts.
    #[error("end {end} is before start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// A transition was required but the entry is already closed.
    #[error("time entry {id} is already stopped")]
    InvalidState { id: EntryId },
    /// The authorizer refused the operation.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The entry was open and is now closed.
    Stopped(TimeEntry),
    /// The entry was already closed and is returned unchanged.
    AlreadyStopped(TimeEntry),
}

impl StopOutcome {
    pub fn entry(&self) -> &TimeEntry {
        match self {
            Self::Stopped(entry) | Self::AlreadyStopped(entry) => entry,
        }
    }

    pub fn into_entry(self) -> TimeEntry {
        match self {
            Self::Stopped(entry) | Self::AlreadyStopped(entry) => entry,
        }
    }

    pub const fn is_transition(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Converts a no-op stop into [`LifecycleError::InvalidState`].
    ///
    /// For callers that expected the entry to be running.
    pub fn require_transition(self) -> Result<TimeEntry, LifecycleError> {
        match self {
            Self::Stopped(entry) => Ok(entry),
            Self::AlreadyStopped(entry) => Err(LifecycleError::InvalidState {
                id: entry.id().clone(),
            }),
        }
    }
}

/// Applies the time entry rules with an injected authorizer and clock.
#[derive(Debug, Clone)]
pub struct TimeEntryLifecycle<A, C = SystemClock> {
    authorizer: A,
    clock: C,
}

impl<A: Authorizer> TimeEntryLifecycle<A> {
    pub const fn with_system_clock(authorizer: A) -> Self {
        Self {
            authorizer,
            clock: SystemClock,
        }
    }
}

impl<A: Authorizer, C: Clock> TimeEntryLifecycle<A, C> {
    pub const fn new(authorizer: A, clock: C) -> Self {
        Self { authorizer, clock }
    }

    /// The current instant at storage precision.
    pub fn now(&self) -> DateTime<Utc> {
        to_storage_precision(self.clock.now())
    }

    /// Opens a new running entry starting now.
    pub fn start(&self, owner: &UserId, new: NewEntry) -> Result<TimeEntry, LifecycleError> {
        self.authorizer.check(owner, &new.project, Access::Write)?;
        let entry = TimeEntry::new(
            EntryId::generate(),
            owner.clone(),
            new,
            self.now(),
            EntryState::Open,
        );
        tracing::debug!(entry = %entry.id(), project = %entry.project(), "timer started");
        Ok(entry)
    }

    /// Closes an open entry at `end`, or now when `end` is omitted.
    ///
    /// Stopping a closed entry returns [`StopOutcome::AlreadyStopped`] with
    /// the entry untouched.
    pub fn stop(
        &self,
        actor: &UserId,
        entry: &TimeEntry,
        end: Option<DateTime<Utc>>,
    ) -> Result<StopOutcome, LifecycleError> {
        self.authorizer.check(actor, entry.project(), Access::Write)?;
        if !entry.is_running() {
            tracing::debug!(entry = %entry.id(), "stop ignored: entry already closed");
            return Ok(StopOutcome::AlreadyStopped(entry.clone()));
        }

        let end = end.map_or_else(|| self.now(), to_storage_precision);
        let closed = entry
            .closed_at(end)
            .ok_or(LifecycleError::InvalidRange {
                start: entry.start(),
                end,
            })?;
        tracing::debug!(
            entry = %closed.id(),
            duration_minutes = ?closed.duration_minutes(),
            "timer stopped"
        );
        Ok(StopOutcome::Stopped(closed))
    }

    /// Closes an entry whose running flag was cleared without an end.
    ///
    /// Equivalent to [`stop`](Self::stop) with the end defaulted to now.
    pub fn close_implicit(
        &self,
        actor: &UserId,
        entry: &TimeEntry,
    ) -> Result<StopOutcome, LifecycleError> {
        self.stop(actor, entry, None)
    }

    /// Creates an entry that is already closed.
    pub fn record_manual(
        &self,
        owner: &UserId,
        new: NewEntry,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeEntry, LifecycleError> {
        let (start, end) = (to_storage_precision(start), to_storage_precision(end));
        if end < start {
            return Err(LifecycleError::InvalidRange { start, end });
        }
        self.authorizer.check(owner, &new.project, Access::Write)?;

        let open = TimeEntry::new(
            EntryId::generate(),
            owner.clone(),
            new,
            start,
            EntryState::Open,
        );
        let entry = open
            .closed_at(end)
            .ok_or(LifecycleError::InvalidRange { start, end })?;
        tracing::debug!(
            entry = %entry.id(),
            duration_minutes = ?entry.duration_minutes(),
            "manual entry recorded"
        );
        Ok(entry)
    }

    /// Changes description or category. Never touches timing or state.
    pub fn edit(
        &self,
        actor: &UserId,
        entry: &TimeEntry,
        edit: &EntryEdit,
    ) -> Result<TimeEntry, LifecycleError> {
        self.authorizer.check(actor, entry.project(), Access::Write)?;
        Ok(entry.edited(edit))
    }
}
