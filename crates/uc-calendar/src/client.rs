//! The remote calendar interface used by the upsert sequencer.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use thiserror::Error;

use uc_core::{Credential, RemoteEventId, Session};

/// Calendar client errors.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// The credential lacks the calendar scope; interactive consent can fix it.
    #[error("calendar consent required: {message}")]
    ConsentRequired { message: String },
    /// The remote event no longer exists.
    #[error("calendar event not found: {id}")]
    NotFound { id: RemoteEventId },
    /// The configured API base URL is unusable.
    #[error("invalid calendar API base URL: {url}")]
    InvalidBaseUrl { url: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A calendar event to be created for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl NewCalendarEvent {
    /// Describes `session` for the calendar. Returns `None` if the session's
    /// timestamps cannot be represented.
    pub fn for_session(session: &Session, app_name: &str) -> Option<Self> {
        Some(Self {
            summary: format!("Used {app_name}"),
            description: format!("Package: {}", session.app),
            start: session.start()?,
            end: session.end()?,
        })
    }

    pub(crate) fn to_json(&self) -> Value {
        json!({
            "summary": self.summary,
            "description": self.description,
            "start": { "dateTime": format_datetime(self.start) },
            "end": { "dateTime": format_datetime(self.end) },
        })
    }
}

/// An event fetched from the calendar, kept whole so an update writes back
/// every field the service returned.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub id: RemoteEventId,
    pub resource: Value,
}

impl RemoteEvent {
    /// The event's end time, if it has a timed end.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        let raw = self.resource.pointer("/end/dateTime")?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Overwrites the event's end time.
    pub fn set_end(&mut self, end: DateTime<Utc>) {
        self.resource["end"] = json!({ "dateTime": format_datetime(end) });
    }
}

/// Remote calendar operations, keyed by the remote event identifier.
pub trait CalendarClient: Send + Sync {
    /// Creates an event and returns its identifier.
    fn create(
        &self,
        credential: &Credential,
        event: &NewCalendarEvent,
    ) -> impl Future<Output = Result<RemoteEventId, CalendarError>> + Send;

    /// Fetches an event. Missing or cancelled events yield [`CalendarError::NotFound`].
    fn get(
        &self,
        credential: &Credential,
        id: &RemoteEventId,
    ) -> impl Future<Output = Result<RemoteEvent, CalendarError>> + Send;

    /// Writes back a previously fetched event.
    fn update(
        &self,
        credential: &Credential,
        event: &RemoteEvent,
    ) -> impl Future<Output = Result<(), CalendarError>> + Send;
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use uc_core::AppId;

    fn session() -> Session {
        Session::new(
            AppId::new("com.example.reader").unwrap(),
            1_700_000_000_000,
            1_700_000_060_000,
        )
        .unwrap()
    }

    #[test]
    fn new_event_describes_session() {
        let event = NewCalendarEvent::for_session(&session(), "Reader").unwrap();
        assert_eq!(event.summary, "Used Reader");
        assert_eq!(event.description, "Package: com.example.reader");

        let body = event.to_json();
        assert_eq!(body["start"]["dateTime"], "2023-11-14T22:13:20.000Z");
        assert_eq!(body["end"]["dateTime"], "2023-11-14T22:14:20.000Z");
    }

    #[test]
    fn remote_event_end_can_be_overwritten() {
        let mut event = RemoteEvent {
            id: RemoteEventId::new("evt-1").unwrap(),
            resource: json!({
                "id": "evt-1",
                "summary": "Used Reader",
                "end": { "dateTime": "2023-11-14T22:14:20Z" }
            }),
        };
        let original_end = event.end().unwrap();
        let new_end = original_end + chrono::Duration::minutes(5);

        event.set_end(new_end);
        assert_eq!(event.end(), Some(new_end));
        assert_eq!(event.resource["summary"], "Used Reader");
    }
}
