//! `tt log`: record a manual entry.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tt_core::{Category, UserId, format_minutes};
use tt_db::Database;

use super::util::{new_entry, parse_datetime, short_id};

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Project name or ID.
    pub project: String,

    /// Start time (RFC 3339 or "N units ago").
    #[arg(long, value_name = "TIME")]
    pub start: String,

    /// End time (RFC 3339 or "N units ago").
    #[arg(long, value_name = "TIME")]
    pub end: String,

    /// Task name or ID within the project.
    #[arg(long)]
    pub task: Option<String>,

    /// What you worked on.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Entry category (work, study, break, custom).
    #[arg(long)]
    pub category: Option<Category>,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &UserId,
    args: &LogArgs,
    default_category: Category,
) -> Result<()> {
    let now = db.now();
    let start = parse_datetime(&args.start, now)?;
    let end = parse_datetime(&args.end, now)?;
    let (project, new) = new_entry(
        db,
        actor,
        &args.project,
        args.task.as_deref(),
        args.description.clone(),
        args.category.unwrap_or(default_category),
    )?;

    let entry = db.record_manual(actor, new, start, end)?;
    writeln!(
        writer,
        "Logged {} on {} ({})",
        format_minutes(entry.duration_minutes().unwrap_or(0)),
        project.name,
        short_id(entry.id().as_str())
    )?;
    Ok(())
}
