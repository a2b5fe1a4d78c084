//! Entry commands: `tt entries`, `tt edit`, `tt rm`.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::TimeZone;
use clap::Args;
use tt_core::{Category, EntryEdit, UserId, format_minutes};
use tt_db::Database;

use super::period::PeriodArgs;
use super::timer::label;
use super::util::{Names, format_instant, short_id};

#[derive(Debug, Args)]
pub struct EntriesArgs {
    #[command(flatten)]
    pub period: PeriodArgs,

    /// Show every entry in this project, including other members' entries.
    #[arg(long)]
    pub project: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Entry ID or prefix.
    pub entry: String,

    /// New description. An empty string clears it.
    #[arg(short, long)]
    pub description: Option<String>,

    /// New category (work, study, break, custom).
    #[arg(long)]
    pub category: Option<Category>,
}

#[derive(Debug, Args)]
pub struct RmArgs {
    /// Entry ID or prefix.
    pub entry: String,
}

pub fn list<W: Write, Tz: TimeZone>(
    writer: &mut W,
    db: &Database,
    actor: &UserId,
    args: &EntriesArgs,
    tz: &Tz,
) -> Result<()>
where
    Tz::Offset: std::fmt::Display,
{
    let now = db.now();
    let today = now.with_timezone(tz).date_naive();
    let (start, end) = args.period.resolve(now)?.boundaries(today, tz);
    let entries = match &args.project {
        Some(key) => {
            let project = db.find_project(actor, key)?;
            db.list_project_entries(actor, &project.id)?
                .into_iter()
                .filter(|entry| entry.start() >= start && entry.start() < end)
                .collect()
        }
        None => db.list_entries(actor, Some((start, end)))?,
    };

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }
    if entries.is_empty() {
        writeln!(writer, "No entries in this period.")?;
        return Ok(());
    }

    let names = Names::load(db, actor)?;
    let mut total = 0;
    for entry in &entries {
        let duration = match entry.duration_minutes() {
            Some(minutes) => {
                total += minutes;
                format_minutes(minutes)
            }
            None => "running".to_string(),
        };
        let mut line = format!(
            "{}  {}  {duration:>7}  {:<6} {}",
            short_id(entry.id().as_str()),
            format_instant(entry.start(), tz),
            entry.category(),
            label(&names, entry)
        );
        if entry.owner() != actor {
            line.push_str(&format!(" [{}]", entry.owner()));
        }
        if let Some(description) = entry.description() {
            line.push_str(": ");
            line.push_str(description);
        }
        writeln!(writer, "{line}")?;
    }
    writeln!(writer, "Total: {}", format_minutes(total))?;
    Ok(())
}

pub fn edit<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &UserId,
    args: &EditArgs,
) -> Result<()> {
    let edit = EntryEdit {
        description: args.description.clone(),
        category: args.category,
    };
    if edit.is_empty() {
        bail!("nothing to change; pass --description or --category");
    }
    let entry = db.find_entry(actor, &args.entry)?;
    let edited = db.edit_entry(actor, entry.id(), &edit)?;
    writeln!(writer, "Updated entry {}", short_id(edited.id().as_str()))?;
    Ok(())
}

pub fn rm<W: Write>(writer: &mut W, db: &mut Database, actor: &UserId, args: &RmArgs) -> Result<()> {
    let entry = db.find_entry(actor, &args.entry)?;
    db.delete_entry(actor, entry.id())?;
    writeln!(writer, "Deleted entry {}", short_id(entry.id().as_str()))?;
    Ok(())
}
