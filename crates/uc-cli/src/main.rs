use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use uc_cli::commands::{account, apps, log_test, sessions, status, sync};
use uc_cli::{AppState, AppsAction, Cli, Commands, Config};
use uc_core::Credential;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(uc_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = uc_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (mut db, config) = open_database(cli.config.as_deref())?;
    let mut state = AppState::load(&db, config)?;
    let mut stdout = std::io::stdout().lock();

    match command {
        Commands::Login {
            email,
            id_token,
            access_token,
        } => {
            let mut credential = Credential::new(email.clone(), id_token.clone());
            credential.access_token.clone_from(access_token);
            account::login(&mut stdout, &mut db, &mut state, credential)?;
        }
        Commands::Logout => account::logout(&mut stdout, &mut db, &mut state)?,
        Commands::Status => status::run(&mut stdout, &db, &state)?,
        Commands::Apps(action) => match action {
            AppsAction::Add {
                package,
                name,
                system,
            } => apps::add(&mut stdout, &mut db, package, name.clone(), *system)?,
            AppsAction::Remove { package } => apps::remove(&mut stdout, &mut db, package)?,
            AppsAction::List { json } => apps::list(&mut stdout, &db, &state.config, *json)?,
        },
        Commands::Sessions { now, json } => {
            sessions::run(&mut stdout, &db, &state, now.as_deref(), *json)?;
        }
        Commands::Sync { now, no_consent } => {
            sync::run(&mut stdout, &mut db, &mut state, now.as_deref(), *no_consent)?;
        }
        Commands::LogTest => log_test::run(&mut stdout, &mut db, &mut state)?,
    }

    Ok(())
}
