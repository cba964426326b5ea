//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use regex::Regex;

/// `--now` offsets such as `90 minutes ago`, `2h ago` or `1 week ago`.
static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<count>\d{1,9})\s*(?<unit>m|mins?|minutes?|h|hours?|d|days?|w|weeks?)\s+ago$")
        .expect("offset pattern is valid")
});

/// The evaluation time for a pass.
///
/// `--now` takes an RFC 3339 timestamp or an offset back from the clock.
/// Without it the clock is used as is.
pub fn resolve_now(now: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    let clock = Utc::now();
    let Some(text) = now.map(str::trim) else {
        return Ok(clock);
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }

    let caps = OFFSET_RE.captures(text).with_context(|| {
        format!("invalid --now value {text:?}: use 2026-01-15T10:30:00Z or '2 hours ago'")
    })?;
    let count: i64 = caps["count"].parse().context("invalid --now offset")?;
    let minutes_per_unit = match caps["unit"].as_bytes()[0] {
        b'm' => 1,
        b'h' => 60,
        b'd' => 24 * 60,
        _ => 7 * 24 * 60,
    };
    count
        .checked_mul(minutes_per_unit)
        .and_then(TimeDelta::try_minutes)
        .and_then(|offset| clock.checked_sub_signed(offset))
        .with_context(|| format!("--now offset out of range: {text}"))
}

/// Formats epoch milliseconds as an RFC 3339 UTC timestamp.
pub fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms).map_or_else(
        || ms.to_string(),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Formats a duration in milliseconds as `1h02m03s`, `2m05s`, or `45s`.
pub fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
