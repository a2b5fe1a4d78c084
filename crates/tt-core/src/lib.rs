//! Core domain logic for the time tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Time entries: the open/closed state and its invariants
//! - Lifecycle: starting, stopping and manually recording entries
//! - Duration: the rounding rule shared with the storage trigger
//! - Authorization: the capability check injected into every mutation

pub mod auth;
pub mod clock;
mod duration;
mod entry;
mod lifecycle;
pub mod types;

pub use auth::{Access, AllowAll, AuthError, Authorizer, DenyAll};
pub use clock::{Clock, FixedClock, SystemClock};
pub use duration::{duration_minutes, format_minutes, to_storage_precision};
pub use entry::{EntryEdit, EntryState, NewEntry, TimeEntry, TimeEntryRecord};
pub use lifecycle::{LifecycleError, StopOutcome, TimeEntryLifecycle};
pub use types::{Category, EntryId, ProjectId, TaskId, UserId, ValidationError};
