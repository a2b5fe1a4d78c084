use std::io;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use tt_cli::commands::{entries, log, project, report, task, timer};
use tt_cli::{Cli, Commands, Config};

/// Open the configured database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<tt_db::Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    tt_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    let actor = config.actor().context("invalid user name")?;
    let mut db = open_database(&config)?;
    let mut out = io::stdout().lock();

    match command {
        Commands::Project(command) => project::run(&mut out, &mut db, &actor, command)?,
        Commands::Task(command) => task::run(&mut out, &mut db, &actor, command)?,
        Commands::Start(args) => {
            timer::start(&mut out, &mut db, &actor, args, config.default_category)?;
        }
        Commands::Stop(args) => timer::stop(&mut out, &mut db, &actor, args)?,
        Commands::Log(args) => log::run(&mut out, &mut db, &actor, args, config.default_category)?,
        Commands::Status => timer::status(&mut out, &db, &actor, &Local)?,
        Commands::Entries(args) => entries::list(&mut out, &db, &actor, args, &Local)?,
        Commands::Edit(args) => entries::edit(&mut out, &mut db, &actor, args)?,
        Commands::Rm(args) => entries::rm(&mut out, &mut db, &actor, args)?,
        Commands::Report(args) => report::run(&mut out, &db, &actor, args, &Local)?,
    }

    Ok(())
}
