//! Print the sessions reconstructed from the lookback window.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use uc_core::{
    Session, SourceError, UsageEventSource, app_label, lookback_window, reconstruct_sessions,
    tracked_apps,
};
use uc_db::Database;

use super::util::{format_duration, format_ms, resolve_now};
use crate::{AppState, Config};

#[derive(Debug, Serialize)]
struct SessionRow {
    package: String,
    name: String,
    start: String,
    end: String,
    start_ms: i64,
    end_ms: i64,
    duration_ms: i64,
}

/// Reconstructs the tracked-app sessions in the window ending at `now_ms`.
pub(crate) fn recent_sessions<S>(
    source: &S,
    db: &Database,
    config: &Config,
    now_ms: i64,
) -> Result<Vec<Session>, SourceError>
where
    S: UsageEventSource + ?Sized,
{
    let (start_ms, end_ms) = lookback_window(now_ms);
    let events = source.query(start_ms, end_ms)?;
    let tracked = tracked_apps(db, &config.excluded_packages);
    if tracked.is_empty() {
        tracing::warn!("no tracked apps registered; every event will be skipped");
    }
    let sessions = reconstruct_sessions(&events, &tracked, now_ms);
    tracing::debug!(
        events = events.len(),
        tracked = tracked.len(),
        sessions = sessions.len(),
        "reconstructed sessions"
    );
    Ok(sessions)
}

/// Tells the user how to grant usage access. The pass is not retried.
pub(crate) fn write_usage_access_hint<W: Write>(writer: &mut W, path: &Path) -> Result<()> {
    writeln!(
        writer,
        "Usage access not granted: cannot read {}.",
        path.display()
    )?;
    writeln!(
        writer,
        "Point events_path (or UC_EVENTS_PATH) at a readable usage log and run again."
    )?;
    Ok(())
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    state: &AppState,
    now: Option<&str>,
    json: bool,
) -> Result<()> {
    let now = resolve_now(now)?;
    let now_ms = now.timestamp_millis();
    let source = state.usage_source();

    let sessions = match recent_sessions(&source, db, &state.config, now_ms) {
        Ok(sessions) => sessions,
        Err(SourceError::PermissionDenied { path }) => {
            return write_usage_access_hint(writer, &path);
        }
        Err(err) => return Err(err).context("failed to read usage events"),
    };

    let rows: Vec<SessionRow> = sessions
        .iter()
        .map(|session| SessionRow {
            package: session.app.to_string(),
            name: app_label(db, &session.app),
            start: format_ms(session.start_ms),
            end: format_ms(session.end_ms),
            start_ms: session.start_ms,
            end_ms: session.end_ms,
            duration_ms: session.duration_ms(),
        })
        .collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    let (start_ms, end_ms) = lookback_window(now_ms);
    writeln!(
        writer,
        "Sessions from {} to {}:",
        format_ms(start_ms),
        format_ms(end_ms)
    )?;
    if rows.is_empty() {
        writeln!(writer, "No sessions.")?;
        return Ok(());
    }
    for row in &rows {
        writeln!(
            writer,
            "{}  {}  {:>8}  {} ({})",
            row.start,
            row.end,
            format_duration(row.duration_ms),
            row.name,
            row.package
        )?;
    }
    Ok(())
}
