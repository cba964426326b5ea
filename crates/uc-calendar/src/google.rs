//! Google Calendar v3 REST client.

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use uc_core::{Credential, RemoteEventId};

use crate::client::{CalendarClient, CalendarError, NewCalendarEvent, RemoteEvent};

/// Production endpoint of the Calendar API.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// The signed-in user's default calendar.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Google Calendar API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: Url,
    calendar_id: String,
}

impl GoogleCalendarClient {
    /// Creates a client for `calendar_id` against the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry a path, or if the HTTP
    /// client fails to build.
    pub fn new(base_url: &str, calendar_id: impl Into<String>) -> Result<Self, CalendarError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| CalendarError::InvalidBaseUrl {
                url: base_url.to_string(),
            })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("uc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CalendarError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            calendar_id: calendar_id.into(),
        })
    }

    /// A client for the user's primary calendar on the production API.
    pub fn primary() -> Result<Self, CalendarError> {
        Self::new(DEFAULT_API_BASE, PRIMARY_CALENDAR)
    }

    fn events_url(&self, event_id: Option<&RemoteEventId>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id.as_str());
            }
        }
        url
    }
}

impl CalendarClient for GoogleCalendarClient {
    async fn create(
        &self,
        credential: &Credential,
        event: &NewCalendarEvent,
    ) -> Result<RemoteEventId, CalendarError> {
        let token = access_token(credential)?;
        let response = self
            .http
            .post(self.events_url(None))
            .bearer_auth(token)
            .json(&event.to_json())
            .send()
            .await?;
        let body = read_body(response, None).await?;

        let created: CreatedEvent = serde_json::from_str(&body)
            .map_err(|err| CalendarError::InvalidResponse(err.to_string()))?;
        let id = RemoteEventId::new(created.id)
            .map_err(|err| CalendarError::InvalidResponse(err.to_string()))?;
        tracing::debug!(%id, summary = %event.summary, "calendar event created");
        Ok(id)
    }

    async fn get(
        &self,
        credential: &Credential,
        id: &RemoteEventId,
    ) -> Result<RemoteEvent, CalendarError> {
        let token = access_token(credential)?;
        let response = self
            .http
            .get(self.events_url(Some(id)))
            .bearer_auth(token)
            .send()
            .await?;
        let body = read_body(response, Some(id)).await?;

        let resource: Value = serde_json::from_str(&body)
            .map_err(|err| CalendarError::InvalidResponse(err.to_string()))?;
        if resource.get("status").and_then(Value::as_str) == Some("cancelled") {
            return Err(CalendarError::NotFound { id: id.clone() });
        }
        Ok(RemoteEvent {
            id: id.clone(),
            resource,
        })
    }

    async fn update(&self, credential: &Credential, event: &RemoteEvent) -> Result<(), CalendarError> {
        let token = access_token(credential)?;
        let response = self
            .http
            .put(self.events_url(Some(&event.id)))
            .bearer_auth(token)
            .json(&event.resource)
            .send()
            .await?;
        read_body(response, Some(&event.id)).await?;
        tracing::debug!(id = %event.id, "calendar event updated");
        Ok(())
    }
}

fn access_token(credential: &Credential) -> Result<&str, CalendarError> {
    credential
        .access_token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| CalendarError::ConsentRequired {
            message: format!("no calendar access token for {}", credential.email),
        })
}

/// Returns the body of a successful response, or the classified error.
async fn read_body(
    response: reqwest::Response,
    event_id: Option<&RemoteEventId>,
) -> Result<String, CalendarError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    Err(classify_error(status, &body, event_id))
}

fn classify_error(status: StatusCode, body: &str, event_id: Option<&RemoteEventId>) -> CalendarError {
    let details = parse_api_error(body);
    let message = details
        .as_ref()
        .map_or_else(|| format!("status {status}: {body}"), |d| d.message.clone());

    if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
        if let Some(id) = event_id {
            return CalendarError::NotFound { id: id.clone() };
        }
    }
    if status == StatusCode::UNAUTHORIZED
        || (status == StatusCode::FORBIDDEN
            && details.as_ref().is_some_and(ErrorDetails::is_insufficient_scope))
    {
        return CalendarError::ConsentRequired { message };
    }
    CalendarError::Api {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
    #[serde(default)]
    details: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: Option<String>,
}

impl ErrorDetails {
    fn is_insufficient_scope(&self) -> bool {
        self.errors
            .iter()
            .chain(&self.details)
            .filter_map(|e| e.reason.as_deref())
            .any(|reason| {
                reason == "insufficientPermissions" || reason == "ACCESS_TOKEN_SCOPE_INSUFFICIENT"
            })
    }
}

fn parse_api_error(body: &str) -> Option<ErrorDetails> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.error)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use serde_json::json;

    fn credential() -> Credential {
        Credential::new("user@example.com", "id-token").with_access_token("ya29.token")
    }

    fn event() -> NewCalendarEvent {
        NewCalendarEvent {
            summary: "Used Reader".to_string(),
            description: "Package: com.example.reader".to_string(),
            start: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap(),
        }
    }

    fn remote_id(id: &str) -> RemoteEventId {
        RemoteEventId::new(id).unwrap()
    }

    #[test]
    fn client_rejects_unusable_base_url() {
        assert!(matches!(
            GoogleCalendarClient::new("not a url", PRIMARY_CALENDAR),
            Err(CalendarError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            GoogleCalendarClient::new("mailto:user@example.com", PRIMARY_CALENDAR),
            Err(CalendarError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn events_url_encodes_calendar_id() {
        let client = GoogleCalendarClient::new(DEFAULT_API_BASE, "team#cal@group.calendar.google.com").unwrap();
        let url = client.events_url(Some(&remote_id("evt-1")));
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team%23cal@group.calendar.google.com/events/evt-1"
        );
    }

    #[test]
    fn classify_insufficient_scope_as_consent() {
        let body = json!({
            "error": {
                "code": 403,
                "message": "Request had insufficient authentication scopes.",
                "errors": [{ "reason": "insufficientPermissions" }],
                "status": "PERMISSION_DENIED"
            }
        })
        .to_string();
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, &body, None),
            CalendarError::ConsentRequired { .. }
        ));
    }

    #[test]
    fn classify_quota_error_as_api_error() {
        let body = json!({
            "error": {
                "code": 403,
                "message": "Rate Limit Exceeded",
                "errors": [{ "reason": "rateLimitExceeded" }]
            }
        })
        .to_string();
        match classify_error(StatusCode::FORBIDDEN, &body, None) {
            CalendarError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Rate Limit Exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn classify_not_found_only_for_event_calls() {
        let id = remote_id("evt-1");
        assert!(matches!(
            classify_error(StatusCode::GONE, "", Some(&id)),
            CalendarError::NotFound { .. }
        ));
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, "", None),
            CalendarError::Api { status: 404, .. }
        ));
    }

    #[tokio::test]
    async fn create_posts_event_and_returns_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/primary/events")
            .match_header("authorization", "Bearer ya29.token")
            .match_body(Matcher::PartialJson(json!({
                "summary": "Used Reader",
                "start": { "dateTime": "2025-01-01T09:00:00.000Z" },
                "end": { "dateTime": "2025-01-01T09:30:00.000Z" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"evt-123","status":"confirmed"}"#)
            .create_async()
            .await;

        let client = GoogleCalendarClient::new(&server.url(), PRIMARY_CALENDAR).unwrap();
        let id = client.create(&credential(), &event()).await.unwrap();

        assert_eq!(id.as_str(), "evt-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_without_access_token_requires_consent() {
        let server = mockito::Server::new_async().await;
        let client = GoogleCalendarClient::new(&server.url(), PRIMARY_CALENDAR).unwrap();
        let bare = Credential::new("user@example.com", "id-token");

        let err = client.create(&bare, &event()).await.unwrap_err();
        assert!(matches!(err, CalendarError::ConsentRequired { .. }));
    }

    #[tokio::test]
    async fn unauthorized_requires_consent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/calendars/primary/events")
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
            .create_async()
            .await;

        let client = GoogleCalendarClient::new(&server.url(), PRIMARY_CALENDAR).unwrap();
        let err = client.create(&credential(), &event()).await.unwrap_err();
        assert!(matches!(err, CalendarError::ConsentRequired { message } if message == "Invalid Credentials"));
    }

    #[tokio::test]
    async fn get_then_update_extends_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendars/primary/events/evt-1")
            .with_status(200)
            .with_body(
                json!({
                    "id": "evt-1",
                    "summary": "Used Reader",
                    "start": { "dateTime": "2025-01-01T09:00:00Z" },
                    "end": { "dateTime": "2025-01-01T09:30:00Z" }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/calendars/primary/events/evt-1")
            .match_body(Matcher::PartialJson(json!({
                "summary": "Used Reader",
                "end": { "dateTime": "2025-01-01T10:00:00.000Z" }
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt-1"}"#)
            .create_async()
            .await;

        let client = GoogleCalendarClient::new(&server.url(), PRIMARY_CALENDAR).unwrap();
        let mut existing = client.get(&credential(), &remote_id("evt-1")).await.unwrap();
        existing.set_end(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        client.update(&credential(), &existing).await.unwrap();

        update.assert_async().await;
    }

    #[tokio::test]
    async fn get_cancelled_event_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendars/primary/events/evt-1")
            .with_status(200)
            .with_body(r#"{"id":"evt-1","status":"cancelled"}"#)
            .create_async()
            .await;

        let client = GoogleCalendarClient::new(&server.url(), PRIMARY_CALENDAR).unwrap();
        let err = client.get(&credential(), &remote_id("evt-1")).await.unwrap_err();
        assert!(matches!(err, CalendarError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_missing_event_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendars/primary/events/evt-gone")
            .with_status(404)
            .with_body(r#"{"error":{"code":404,"message":"Not Found"}}"#)
            .create_async()
            .await;

        let client = GoogleCalendarClient::new(&server.url(), PRIMARY_CALENDAR).unwrap();
        let err = client.get(&credential(), &remote_id("evt-gone")).await.unwrap_err();
        assert!(matches!(err, CalendarError::NotFound { id } if id.as_str() == "evt-gone"));
    }
}
