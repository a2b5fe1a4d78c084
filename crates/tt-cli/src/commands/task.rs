//! Task commands.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use tt_core::UserId;
use tt_db::Database;

use super::util::short_id;

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Create a task in a project.
    Add {
        /// Project name or ID.
        project: String,
        /// Task name.
        name: String,
    },
    /// List the tasks of a project.
    List {
        /// Project name or ID.
        project: String,
    },
    /// Delete a task. Its entries stay in the project without a task.
    Rm {
        /// Project name or ID.
        project: String,
        /// Task name or ID.
        task: String,
    },
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &UserId,
    command: &TaskCommand,
) -> Result<()> {
    match command {
        TaskCommand::Add { project, name } => {
            let project = db.find_project(actor, project)?;
            let task = db.create_task(actor, &project.id, name)?;
            writeln!(
                writer,
                "Created task {} in {} ({})",
                task.name,
                project.name,
                short_id(task.id.as_str())
            )?;
        }
        TaskCommand::List { project } => {
            let project = db.find_project(actor, project)?;
            let tasks = db.list_tasks(actor, &project.id)?;
            if tasks.is_empty() {
                writeln!(writer, "No tasks in {}.", project.name)?;
            }
            for task in tasks {
                writeln!(writer, "{}  {}", short_id(task.id.as_str()), task.name)?;
            }
        }
        TaskCommand::Rm { project, task } => {
            let project = db.find_project(actor, project)?;
            let task = db.find_task(&project.id, task)?;
            db.delete_task(actor, &task.id)?;
            writeln!(writer, "Deleted task {} from {}", task.name, project.name)?;
        }
    }
    Ok(())
}
