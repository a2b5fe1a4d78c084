//! Timer commands: `tt start`, `tt stop`, `tt status`.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::TimeZone;
use clap::Args;
use tt_core::{Category, StopOutcome, TimeEntry, UserId, format_minutes};
use tt_db::{Database, DbError};

use super::util::{Names, format_instant, new_entry, parse_datetime, short_id};

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Project name or ID.
    pub project: String,

    /// Task name or ID within the project.
    #[arg(long)]
    pub task: Option<String>,

    /// What you are working on.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Entry category (work, study, break, custom).
    #[arg(long)]
    pub category: Option<Category>,

    /// Stop the running timer first instead of failing.
    #[arg(long)]
    pub switch: bool,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Entry ID or prefix. Defaults to the running timer.
    pub entry: Option<String>,

    /// End time (RFC 3339 or "N units ago"). Defaults to now.
    #[arg(long, value_name = "TIME")]
    pub at: Option<String>,
}

pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &UserId,
    args: &StartArgs,
    default_category: Category,
) -> Result<()> {
    let (project, new) = new_entry(
        db,
        actor,
        &args.project,
        args.task.as_deref(),
        args.description.clone(),
        args.category.unwrap_or(default_category),
    )?;

    let started = if args.switch {
        let outcome = db.switch_timer(actor, new)?;
        if let Some(stopped) = &outcome.stopped {
            let names = Names::load(db, actor)?;
            write_stopped(writer, &names, stopped)?;
        }
        outcome.started
    } else {
        match db.start_timer(actor, new) {
            Ok(entry) => entry,
            Err(DbError::TimerAlreadyRunning { entry_id }) => bail!(
                "timer {} is already running; stop it first or pass --switch",
                short_id(entry_id.as_str())
            ),
            Err(err) => return Err(err.into()),
        }
    };

    writeln!(
        writer,
        "Started timer on {} ({})",
        project.name,
        short_id(started.id().as_str())
    )?;
    Ok(())
}

pub fn stop<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &UserId,
    args: &StopArgs,
) -> Result<()> {
    let end = args
        .at
        .as_deref()
        .map(|at| parse_datetime(at, db.now()))
        .transpose()?;
    let id = args
        .entry
        .as_deref()
        .map(|key| db.find_entry(actor, key).map(|entry| entry.id().clone()))
        .transpose()?;

    let outcome = match db.stop_timer(actor, id.as_ref(), end) {
        Ok(outcome) => outcome,
        Err(DbError::NotFound {
            kind: "running timer",
            ..
        }) => {
            writeln!(writer, "No timer running.")?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let names = Names::load(db, actor)?;
    match outcome {
        StopOutcome::Stopped(entry) => write_stopped(writer, &names, &entry)?,
        StopOutcome::AlreadyStopped(entry) => writeln!(
            writer,
            "Entry {} is already stopped ({}); nothing changed.",
            short_id(entry.id().as_str()),
            format_minutes(entry.duration_minutes().unwrap_or(0))
        )?,
    }
    Ok(())
}

pub fn status<W: Write, Tz: TimeZone>(
    writer: &mut W,
    db: &Database,
    actor: &UserId,
    tz: &Tz,
) -> Result<()>
where
    Tz::Offset: std::fmt::Display,
{
    let Some(entry) = db.running_entry(actor)? else {
        writeln!(writer, "No timer running.")?;
        return Ok(());
    };
    let names = Names::load(db, actor)?;

    writeln!(writer, "Running: {}", label(&names, &entry))?;
    writeln!(writer, "  Since:    {}", format_instant(entry.start(), tz))?;
    writeln!(
        writer,
        "  Elapsed:  {}",
        format_minutes(entry.elapsed_minutes(db.now()))
    )?;
    writeln!(writer, "  Category: {}", entry.category())?;
    if let Some(description) = entry.description() {
        writeln!(writer, "  Note:     {description}")?;
    }
    writeln!(writer, "  Entry:    {}", short_id(entry.id().as_str()))?;
    Ok(())
}

/// `Project` or `Project / Task`.
pub fn label(names: &Names, entry: &TimeEntry) -> String {
    let project = names.project(entry.project());
    match entry.task() {
        Some(task) => format!("{project} / {}", names.task(task)),
        None => project.to_string(),
    }
}

fn write_stopped<W: Write>(writer: &mut W, names: &Names, entry: &TimeEntry) -> Result<()> {
    writeln!(
        writer,
        "Stopped {} after {} ({})",
        label(names, entry),
        format_minutes(entry.duration_minutes().unwrap_or(0)),
        short_id(entry.id().as_str())
    )?;
    Ok(())
}
