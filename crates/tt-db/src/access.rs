//! Owner-or-member authorization backed by the projects tables.

use rusqlite::{Connection, OptionalExtension, params};
use tt_core::{Access, AuthError, Authorizer, ProjectId, UserId};

/// Grants project owners every access and members read/write access.
///
/// Borrows a connection (or an open transaction) so checks run inside the
/// same transaction as the mutation they guard.
#[derive(Clone, Copy)]
pub struct ProjectAccess<'c> {
    conn: &'c Connection,
}

impl<'c> ProjectAccess<'c> {
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl Authorizer for ProjectAccess<'_> {
    fn check(&self, actor: &UserId, project: &ProjectId, access: Access) -> Result<(), AuthError> {
        let backend = |err: rusqlite::Error| AuthError::Backend(err.to_string());
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT owner FROM projects WHERE id = ?",
                [project.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        let Some(owner) = owner else {
            return Err(AuthError::UnknownProject(project.clone()));
        };
        if owner == actor.as_str() {
            return Ok(());
        }

        let denied = || AuthError::Denied {
            actor: actor.clone(),
            project: project.clone(),
            access,
        };
        if access == Access::Manage {
            return Err(denied());
        }
        let is_member: bool = self
            .conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM project_members WHERE project_id = ? AND user_id = ?)",
                params![project.as_str(), actor.as_str()],
                |row| row.get(0),
            )
            .map_err(backend)?;
        if is_member {
            Ok(())
        } else {
            tracing::debug!(actor = %actor, project = %project, %access, "access denied");
            Err(denied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Database;
    use crate::tests::user;

    #[test]
    fn owner_member_and_stranger() {
        let mut db = Database::open_in_memory().unwrap();
        let (ana, ben, cy) = (user("ana"), user("ben"), user("cy"));
        let project = db.create_project(&ana, "Website").unwrap();
        db.add_member(&ana, &project.id, &ben).unwrap();

        let auth = db.authorizer();
        for access in [Access::Read, Access::Write, Access::Manage] {
            assert!(auth.check(&ana, &project.id, access).is_ok());
        }
        assert!(auth.check(&ben, &project.id, Access::Read).is_ok());
        assert!(auth.check(&ben, &project.id, Access::Write).is_ok());
        assert!(auth.check(&ben, &project.id, Access::Manage).is_err());

        let err = auth.check(&cy, &project.id, Access::Read).unwrap_err();
        assert_eq!(
            err,
            AuthError::Denied {
                actor: cy,
                project: project.id.clone(),
                access: Access::Read,
            }
        );
    }

    #[test]
    fn unknown_project() {
        let db = Database::open_in_memory().unwrap();
        let missing = ProjectId::new("missing").unwrap();
        let err = db
            .authorizer()
            .check(&user("ana"), &missing, Access::Read)
            .unwrap_err();
        assert_eq!(err, AuthError::UnknownProject(missing));
    }
}
