//! App registry management.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use uc_core::{AppId, AppInfo, tracked_apps};
use uc_db::Database;

use crate::Config;

#[derive(Debug, Serialize)]
struct AppRow<'a> {
    package: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    system: bool,
    tracked: bool,
}

pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    package: &str,
    name: Option<String>,
    is_system: bool,
) -> Result<()> {
    let app = AppId::new(package).context("invalid package id")?;
    let info = AppInfo {
        app,
        display_name: name.filter(|name| !name.trim().is_empty()),
        is_system,
    };
    db.upsert_app(&info).context("failed to register app")?;
    writeln!(writer, "Registered {}", info.app)?;
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, db: &mut Database, package: &str) -> Result<()> {
    let app = AppId::new(package).context("invalid package id")?;
    if db.remove_app(&app).context("failed to remove app")? {
        writeln!(writer, "Removed {app}")?;
    } else {
        writeln!(writer, "{app} is not registered")?;
    }
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, config: &Config, json: bool) -> Result<()> {
    let apps = db.list_apps().context("failed to list apps")?;
    let tracked = tracked_apps(db, &config.excluded_packages);

    let rows: Vec<AppRow<'_>> = apps
        .iter()
        .map(|info| AppRow {
            package: info.app.as_str(),
            name: info.display_name.as_deref(),
            system: info.is_system,
            tracked: tracked.contains(&info.app),
        })
        .collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    if rows.is_empty() {
        writeln!(writer, "No apps registered.")?;
        return Ok(());
    }

    for row in rows {
        let status = if row.tracked {
            "tracked"
        } else if row.system {
            "system"
        } else {
            "excluded"
        };
        let package = row.package;
        match row.name {
            Some(name) => writeln!(writer, "{status:<9} {package} ({name})")?,
            None => writeln!(writer, "{status:<9} {package}")?,
        }
    }
    Ok(())
}
