//! Capability checks injected into the lifecycle.
//!
//! The lifecycle never decides who may touch a project. It asks an
//! [`Authorizer`] before every mutation and surfaces a denial as
//! [`LifecycleError::Unauthorized`](crate::LifecycleError::Unauthorized).

use std::fmt;

use thiserror::Error;

use crate::types::{ProjectId, UserId};

/// The kind of access being requested on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Reading entries, tasks and totals.
    Read,
    /// Creating, stopping, editing or deleting entries and tasks.
    Write,
    /// Deleting the project or changing its membership.
    Manage,
}

impl Access {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Manage => "manage",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The actor has no grant for the requested access.
    #[error("{actor} may not {access} project {project}")]
    Denied {
        actor: UserId,
        project: ProjectId,
        access: Access,
    },
    /// The project does not exist (or is invisible to the actor).
    #[error("project not found: {0}")]
    UnknownProject(ProjectId),
    /// The policy store could not be consulted.
    #[error("authorization check failed: {0}")]
    Backend(String),
}

/// Decides whether an actor may access a project.
pub trait Authorizer {
    fn check(&self, actor: &UserId, project: &ProjectId, access: Access) -> Result<(), AuthError>;
}

impl<A: Authorizer + ?Sized> Authorizer for &A {
    fn check(&self, actor: &UserId, project: &ProjectId, access: Access) -> Result<(), AuthError> {
        (**self).check(actor, project, access)
    }
}

/// Grants everything. For single-user embedding and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check(&self, _: &UserId, _: &ProjectId, _: Access) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl Authorizer for DenyAll {
    fn check(&self, actor: &UserId, project: &ProjectId, access: Access) -> Result<(), AuthError> {
        Err(AuthError::Denied {
            actor: actor.clone(),
            project: project.clone(),
            access,
        })
    }
}
