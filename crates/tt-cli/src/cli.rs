//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::entries::{EditArgs, EntriesArgs, RmArgs};
use crate::commands::log::LogArgs;
use crate::commands::project::ProjectCommand;
use crate::commands::report::ReportArgs;
use crate::commands::task::TaskCommand;
use crate::commands::timer::{StartArgs, StopArgs};

/// Local time tracker.
///
/// Track time against projects and tasks with a start/stop timer or manual
/// entries, then review the totals.
#[derive(Debug, Parser)]
#[command(name = "tt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage tasks within a project.
    #[command(subcommand)]
    Task(TaskCommand),

    /// Start a timer.
    Start(StartArgs),

    /// Stop the running timer, or a specific entry.
    Stop(StopArgs),

    /// Record an entry that already happened.
    Log(LogArgs),

    /// Show the running timer.
    Status,

    /// List time entries.
    Entries(EntriesArgs),

    /// Change the description or category of an entry.
    Edit(EditArgs),

    /// Delete an entry.
    Rm(RmArgs),

    /// Show totals per project and per day.
    Report(ReportArgs),
}
