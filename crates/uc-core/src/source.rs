//! Usage event sources.
//!
//! A source reports every event in a window, tracked or not; filtering by the
//! allowlist is the consumer's job.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::event::UsageEvent;

/// How far back a reconstruction pass looks: two hours.
pub const LOOKBACK_MS: i64 = 2 * 60 * 60 * 1000;

/// Returns the `(start, end)` lookback window ending at `now_ms`.
#[must_use]
pub const fn lookback_window(now_ms: i64) -> (i64, i64) {
    (now_ms - LOOKBACK_MS, now_ms)
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// Usage access has not been granted.
    #[error("usage access not granted: cannot read {}", .path.display())]
    PermissionDenied { path: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid query window: start {start_ms} is after end {end_ms}")]
    InvertedWindow { start_ms: i64, end_ms: i64 },
}

/// Supplies time-ordered usage events for a bounded window.
pub trait UsageEventSource {
    /// Whether the caller may read usage events at all.
    fn has_usage_access(&self) -> bool;

    /// Events with `start_ms <= timestamp <= end_ms`, ascending by timestamp.
    fn query(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageEvent>, SourceError>;
}

/// Reads usage events from a JSON-lines log, one [`UsageEvent`] per line.
///
/// Lines that fail to parse are skipped with a warning.
#[derive(Debug, Clone)]
pub struct JsonlUsageSource {
    path: PathBuf,
}

impl JsonlUsageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageEventSource for JsonlUsageSource {
    fn has_usage_access(&self) -> bool {
        File::open(&self.path).is_ok()
    }

    fn query(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageEvent>, SourceError> {
        if start_ms > end_ms {
            return Err(SourceError::InvertedWindow { start_ms, end_ms });
        }

        let file = File::open(&self.path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                SourceError::PermissionDenied {
                    path: self.path.clone(),
                }
            }
            _ => SourceError::Io(err),
        })?;

        let mut events = Vec::new();
        let mut skipped = 0usize;
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageEvent>(trimmed) {
                Ok(event) if (start_ms..=end_ms).contains(&event.timestamp_ms) => {
                    events.push(event);
                }
                Ok(_) => {}
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(line = idx + 1, %err, "skipping malformed usage event");
                }
            }
        }

        // Stable: events sharing a timestamp keep their log order.
        events.sort_by_key(|event| event.timestamp_ms);
        tracing::debug!(
            path = %self.path.display(),
            count = events.len(),
            skipped,
            "loaded usage events"
        );
        Ok(events)
    }
}
