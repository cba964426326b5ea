//! Serialized create-or-extend of calendar events for sessions.
//!
//! Every upsert runs behind one `tokio::sync::Mutex`, so at most one is in
//! flight and they complete in submission order. The same mutex owns the
//! handle table mapping each logical session to its remote event, so an
//! extension always targets the event created for that session and never one
//! created for another.
//!
//! # Retries
//!
//! - A stale handle (`NotFound` on fetch or update) is cleared and the upsert
//!   is retried once as a fresh create. The cleared key stays visible in
//!   [`UpsertSequencer::handles`] as an empty handle until a create succeeds,
//!   so the stale id can be dropped from storage even if that create fails.
//! - A missing consent scope suspends the upsert on the [`AuthGate`]; once the
//!   user grants it, the upsert is re-run exactly once. The gate is held while
//!   suspended so later sessions cannot overtake it.
//! - Anything else is logged and the session is dropped.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::Mutex;

use uc_core::{
    AuthGate, CalendarEventHandle, ConsentOutcome, ConsentRequest, Credential, RemoteEventId,
    Session, SessionKey, ValidationError,
};

use crate::client::{CalendarClient, CalendarError, NewCalendarEvent};

/// A session to record, with the label to show for its app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    pub session: Session,
    pub app_name: String,
}

impl UpsertRequest {
    pub fn new(session: Session, app_name: impl Into<String>) -> Self {
        Self {
            session,
            app_name: app_name.into(),
        }
    }
}

/// What an upsert did remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(RemoteEventId),
    Extended(RemoteEventId),
}

#[derive(Debug, Error)]
pub enum UpsertError {
    /// The session failed validation; the calendar was not contacted.
    #[error("invalid session: {0}")]
    InvalidSession(#[from] ValidationError),
    #[error("no signed-in account")]
    NotSignedIn,
    #[error("consent for {scope} was declined")]
    ConsentDeclined { scope: String },
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Tally of one pass over a batch of sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub created: usize,
    pub extended: usize,
    pub failed: usize,
}

/// Remote events by session, plus the sessions whose event went missing.
#[derive(Debug, Default)]
struct HandleTable {
    live: HashMap<SessionKey, RemoteEventId>,
    cleared: HashSet<SessionKey>,
}

impl HandleTable {
    fn get(&self, key: &SessionKey) -> Option<&RemoteEventId> {
        self.live.get(key)
    }

    fn set(&mut self, key: &SessionKey, id: RemoteEventId) {
        self.cleared.remove(key);
        self.live.insert(key.clone(), id);
    }

    fn clear(&mut self, key: &SessionKey) {
        if self.live.remove(key).is_some() {
            self.cleared.insert(key.clone());
        }
    }
}

/// Turns sessions into serialized calendar upserts.
#[derive(Debug)]
pub struct UpsertSequencer<C, G> {
    client: C,
    auth: G,
    handles: Mutex<HandleTable>,
}

impl<C: CalendarClient, G: AuthGate> UpsertSequencer<C, G> {
    pub fn new(client: C, auth: G) -> Self {
        Self::with_handles(client, auth, [])
    }

    /// Creates a sequencer that resumes from previously persisted handles.
    /// Empty handles are ignored.
    pub fn with_handles(
        client: C,
        auth: G,
        handles: impl IntoIterator<Item = CalendarEventHandle>,
    ) -> Self {
        let live = handles
            .into_iter()
            .filter_map(|handle| Some((handle.key, handle.remote_event_id?)))
            .collect();
        Self {
            client,
            auth,
            handles: Mutex::new(HandleTable {
                live,
                cleared: HashSet::new(),
            }),
        }
    }

    pub const fn client(&self) -> &C {
        &self.client
    }

    pub const fn auth(&self) -> &G {
        &self.auth
    }

    /// The handle currently held for `key`, empty if none.
    pub async fn handle(&self, key: &SessionKey) -> CalendarEventHandle {
        let handles = self.handles.lock().await;
        CalendarEventHandle {
            key: key.clone(),
            remote_event_id: handles.get(key).cloned(),
        }
    }

    /// Snapshot of every handle, ordered by session.
    ///
    /// Sessions whose stale event was cleared and not yet recreated come back
    /// as empty handles.
    pub async fn handles(&self) -> Vec<CalendarEventHandle> {
        let table = self.handles.lock().await;
        let live = table.live.iter().map(|(key, id)| CalendarEventHandle {
            key: key.clone(),
            remote_event_id: Some(id.clone()),
        });
        let cleared = table
            .cleared
            .iter()
            .map(|key| CalendarEventHandle::empty(key.clone()));
        let mut snapshot: Vec<CalendarEventHandle> = live.chain(cleared).collect();
        snapshot.sort_by(|a, b| {
            a.key
                .start_ms
                .cmp(&b.key.start_ms)
                .then_with(|| a.key.app.cmp(&b.key.app))
        });
        snapshot
    }

    /// Creates or extends the calendar event for one session.
    ///
    /// Failures are logged here; the caller only decides whether to count them.
    pub async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertOutcome, UpsertError> {
        let session = &request.session;
        let result = self.upsert_inner(request).await;
        match &result {
            Ok(UpsertOutcome::Created(id)) => {
                tracing::info!(app = %session.app, start = session.start_ms, end = session.end_ms, %id, "calendar event created");
            }
            Ok(UpsertOutcome::Extended(id)) => {
                tracing::info!(app = %session.app, start = session.start_ms, end = session.end_ms, %id, "calendar event extended");
            }
            Err(err) => {
                tracing::error!(app = %session.app, start = session.start_ms, end = session.end_ms, %err, "dropping session");
            }
        }
        result
    }

    /// Upserts `requests` in order. One failure never stops the pass.
    pub async fn run_pass<'r, I>(&self, requests: I) -> PassReport
    where
        I: IntoIterator<Item = &'r UpsertRequest>,
    {
        let mut report = PassReport::default();
        for request in requests {
            match self.upsert(request).await {
                Ok(UpsertOutcome::Created(_)) => report.created += 1,
                Ok(UpsertOutcome::Extended(_)) => report.extended += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    async fn upsert_inner(&self, request: &UpsertRequest) -> Result<UpsertOutcome, UpsertError> {
        let session = &request.session;
        if !session.is_valid() {
            return Err(ValidationError::InvertedInterval {
                start_ms: session.start_ms,
                end_ms: session.end_ms,
            }
            .into());
        }
        let event = NewCalendarEvent::for_session(session, &request.app_name)
            .ok_or(ValidationError::TimestampOutOfRange { ms: session.end_ms })?;
        let key = session.key();

        let mut handles = self.handles.lock().await;
        let mut consent_granted = false;
        loop {
            let credential = self.auth.current_credential().ok_or(UpsertError::NotSignedIn)?;
            match self.attempt(&credential, &mut handles, &key, &event).await {
                Err(CalendarError::ConsentRequired { message }) if !consent_granted => {
                    tracing::warn!(app = %key.app, %message, "calendar consent required, suspending upsert");
                    let consent = ConsentRequest::calendar(format!(
                        "record usage of {} in your calendar",
                        request.app_name
                    ));
                    let scope = consent.scope.clone();
                    match self.auth.request_consent(consent).await {
                        ConsentOutcome::Granted => consent_granted = true,
                        ConsentOutcome::Declined => return Err(UpsertError::ConsentDeclined { scope }),
                    }
                }
                result => return result.map_err(UpsertError::from),
            }
        }
    }

    async fn attempt(
        &self,
        credential: &Credential,
        handles: &mut HandleTable,
        key: &SessionKey,
        event: &NewCalendarEvent,
    ) -> Result<UpsertOutcome, CalendarError> {
        if let Some(remote_id) = handles.get(key).cloned() {
            match self.extend(credential, &remote_id, event).await {
                Ok(()) => return Ok(UpsertOutcome::Extended(remote_id)),
                Err(CalendarError::NotFound { id }) => {
                    tracing::warn!(app = %key.app, %id, "calendar event missing, creating a new one");
                    handles.clear(key);
                }
                Err(err) => return Err(err),
            }
        }

        let remote_id = self.client.create(credential, event).await?;
        handles.set(key, remote_id.clone());
        Ok(UpsertOutcome::Created(remote_id))
    }

    async fn extend(
        &self,
        credential: &Credential,
        remote_id: &RemoteEventId,
        event: &NewCalendarEvent,
    ) -> Result<(), CalendarError> {
        let mut existing = self.client.get(credential, remote_id).await?;
        existing.set_end(event.end);
        self.client.update(credential, &existing).await
    }
}
