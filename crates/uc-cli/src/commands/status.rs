//! Status command for showing account, usage access, and sync state.

use std::io::Write;

use anyhow::{Context, Result};

use uc_core::{UsageEventSource, tracked_apps};
use uc_db::Database;

use crate::AppState;

pub fn run<W: Write>(writer: &mut W, db: &Database, state: &AppState) -> Result<()> {
    let config = &state.config;
    writeln!(writer, "Usage calendar status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;

    match &state.account {
        Some(account) if account.access_token.is_some() => {
            writeln!(writer, "Account: {} (calendar access granted)", account.email)?;
        }
        Some(account) => {
            writeln!(writer, "Account: {} (calendar consent pending)", account.email)?;
        }
        None => writeln!(writer, "Account: not signed in")?,
    }

    let source = state.usage_source();
    let access = if source.has_usage_access() {
        "readable"
    } else {
        "usage access not granted"
    };
    writeln!(writer, "Usage log: {} ({access})", source.path().display())?;

    let registered = db.list_apps().context("failed to list apps")?.len();
    let tracked = tracked_apps(db, &config.excluded_packages).len();
    writeln!(writer, "Tracked apps: {tracked} of {registered} registered")?;

    let handles = db.count_handles().context("failed to count calendar handles")?;
    writeln!(writer, "Calendar events: {handles}")?;

    Ok(())
}
