use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bd_core::{BurndownEngine, BurndownError};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bd_cli::commands::{events, import, report, sprint, sprints};
use bd_cli::{Cli, Commands, Config, SprintAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(bd_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = bd_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Import) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            import::run(&mut db)?;
        }
        Some(Commands::Sprint(SprintAction::Set { scope, start, end })) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            sprint::set(&mut db, scope, start, end)?;
        }
        Some(Commands::Sprints { json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            sprints::run(&db, *json)?;
        }
        Some(Commands::Report { scope, json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let engine = BurndownEngine::new(config.classifier_config());
            report::run(&db, &engine, scope, *json)?;
        }
        Some(Commands::Events { scope }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            events::run(&db, &config.classifier_config(), scope)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Scope configuration problems are reported plainly.
            match err.downcast_ref::<BurndownError>() {
                Some(burndown) if burndown.is_user_facing() => eprintln!("{burndown}"),
                _ => eprintln!("Error: {err:?}"),
            }
            ExitCode::FAILURE
        }
    }
}
