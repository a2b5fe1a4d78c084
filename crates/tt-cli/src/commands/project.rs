//! Project commands: create, list, delete, share.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use tt_core::UserId;
use tt_db::Database;

use super::util::short_id;

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Create a project.
    Add {
        /// Project name, unique among your projects.
        name: String,
    },
    /// List projects you own or were given access to.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a project with its tasks and entries.
    Rm {
        /// Project name or ID.
        project: String,
    },
    /// Give another user access to a project.
    Share {
        /// Project name or ID.
        project: String,
        /// User to add as a member.
        user: String,
    },
    /// Show who owns a project and who it is shared with.
    Members {
        /// Project name or ID.
        project: String,
    },
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &UserId,
    command: &ProjectCommand,
) -> Result<()> {
    match command {
        ProjectCommand::Add { name } => {
            let project = db.create_project(actor, name)?;
            writeln!(
                writer,
                "Created project {} ({})",
                project.name,
                short_id(project.id.as_str())
            )?;
        }
        ProjectCommand::List { json } => {
            let projects = db.list_projects(actor)?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&projects)?)?;
                return Ok(());
            }
            if projects.is_empty() {
                writeln!(writer, "No projects. Create one with 'tt project add <name>'.")?;
                return Ok(());
            }
            for project in projects {
                let id = short_id(project.id.as_str());
                if &project.owner == actor {
                    writeln!(writer, "{id}  {}", project.name)?;
                } else {
                    writeln!(writer, "{id}  {} (shared by {})", project.name, project.owner)?;
                }
            }
        }
        ProjectCommand::Rm { project } => {
            let project = db.find_project(actor, project)?;
            db.delete_project(actor, &project.id)?;
            writeln!(writer, "Deleted project {}", project.name)?;
        }
        ProjectCommand::Share { project, user } => {
            let project = db.find_project(actor, project)?;
            let member = UserId::new(user.trim())?;
            db.add_member(actor, &project.id, &member)?;
            writeln!(writer, "Shared {} with {member}", project.name)?;
        }
        ProjectCommand::Members { project } => {
            let project = db.find_project(actor, project)?;
            let members = db.list_members(actor, &project.id)?;
            writeln!(writer, "{} (owner: {})", project.name, project.owner)?;
            if members.is_empty() {
                writeln!(writer, "  Not shared with anyone.")?;
            }
            for member in members {
                writeln!(writer, "  {member}")?;
            }
        }
    }
    Ok(())
}
