//! Credentials and the interactive consent interface.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

/// OAuth scope needed to create and update calendar events.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// The signed-in account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub email: String,
    /// Identity token from sign-in, used for silent re-authentication.
    pub id_token: String,
    /// Bearer token for calendar calls, once consent has been granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Credential {
    pub fn new(email: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            id_token: id_token.into(),
            access_token: None,
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("id_token", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// A request for the user to grant an additional scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub scope: String,
    /// Why the scope is needed, shown to the user.
    pub reason: String,
}

impl ConsentRequest {
    pub fn calendar(reason: impl Into<String>) -> Self {
        Self {
            scope: CALENDAR_SCOPE.to_string(),
            reason: reason.into(),
        }
    }
}

/// How the user answered a consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    Granted,
    Declined,
}

/// Supplies credentials and suspends callers on interactive consent.
pub trait AuthGate: Send + Sync {
    /// The current credential, or `None` when signed out.
    fn current_credential(&self) -> Option<Credential>;

    /// Suspends until the user answers `request`. Resolves exactly once.
    fn request_consent(
        &self,
        request: ConsentRequest,
    ) -> impl Future<Output = ConsentOutcome> + Send;
}
