//! Raw usage events reported by the platform.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::AppId;

/// Platform code for an app moving to the foreground.
const MOVE_TO_FOREGROUND: i64 = 1;
/// Platform code for an app moving to the background.
const MOVE_TO_BACKGROUND: i64 = 2;

/// The kind of transition a usage event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageEventKind {
    /// The app became the foreground app.
    Foreground,
    /// The app left the foreground.
    Background,
    /// Any other platform event (configuration change, standby bucket, ...).
    Other,
}

impl UsageEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::Other => "other",
        }
    }

    /// Maps a numeric platform event code.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            MOVE_TO_FOREGROUND => Self::Foreground,
            MOVE_TO_BACKGROUND => Self::Background,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for UsageEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageEventKind {
    type Err = std::convert::Infallible;

    /// Unrecognized kinds map to [`UsageEventKind::Other`] so that every event
    /// the source sees can still be carried through.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "foreground" | "move_to_foreground" | "activity_resumed" => Self::Foreground,
            "background" | "move_to_background" | "activity_paused" => Self::Background,
            other => match other.parse::<i64>() {
                Ok(code) => Self::from_code(code),
                Err(_) => Self::Other,
            },
        };
        Ok(kind)
    }
}

impl Serialize for UsageEventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UsageEventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Self::from_code(code),
            Raw::Name(name) => name.parse().unwrap_or(Self::Other),
        })
    }
}

/// A single usage transition for one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// The package the event belongs to.
    #[serde(rename = "package")]
    pub app: AppId,
    /// When the event occurred (epoch milliseconds).
    pub timestamp_ms: i64,
    /// What happened.
    pub kind: UsageEventKind,
}

impl UsageEvent {
    pub const fn new(app: AppId, timestamp_ms: i64, kind: UsageEventKind) -> Self {
        Self {
            app,
            timestamp_ms,
            kind,
        }
    }
}
