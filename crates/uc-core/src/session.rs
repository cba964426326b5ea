//! Reconstructed usage sessions and their calendar handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AppId, RemoteEventId, ValidationError};

/// A contiguous interval during which one app was in the foreground.
///
/// Fields are public so sessions can be deserialized and inspected; use
/// [`Session::new`] or [`Session::is_valid`] to enforce `end_ms > start_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    /// The app that was in the foreground.
    pub app: AppId,
    /// Session start (epoch milliseconds).
    pub start_ms: i64,
    /// Session end (epoch milliseconds), strictly after `start_ms`.
    pub end_ms: i64,
}

impl Session {
    /// Creates a session, rejecting empty or inverted intervals.
    pub fn new(app: AppId, start_ms: i64, end_ms: i64) -> Result<Self, ValidationError> {
        if end_ms <= start_ms {
            return Err(ValidationError::InvertedInterval { start_ms, end_ms });
        }
        Ok(Self {
            app,
            start_ms,
            end_ms,
        })
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.end_ms > self.start_ms
    }

    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// The identity of the logical session this record belongs to.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey {
            app: self.app.clone(),
            start_ms: self.start_ms,
        }
    }

    /// Start as a UTC timestamp, if representable.
    #[must_use]
    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_ms)
    }

    /// End as a UTC timestamp, if representable.
    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end_ms)
    }
}

/// Identifies one logical session: the app plus the moment it entered the
/// foreground. Later records of the same session only move the end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub app: AppId,
    pub start_ms: i64,
}

/// Links a logical session to the remote calendar event that records it.
///
/// `remote_event_id` stays empty until the first successful create. Handles
/// are never shared between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventHandle {
    pub key: SessionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_event_id: Option<RemoteEventId>,
}

impl CalendarEventHandle {
    /// An empty handle for a session that has not been created remotely yet.
    #[must_use]
    pub const fn empty(key: SessionKey) -> Self {
        Self {
            key,
            remote_event_id: None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remote_event_id.is_none()
    }
}
