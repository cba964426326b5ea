//! One-shot interactive consent.
//!
//! [`ConsentBroker`] is the [`AuthGate`] handed to the sequencer. Each consent
//! request travels to the user-facing side as a [`PendingConsent`] carrying
//! its own reply channel, so any number of suspended upserts can wait at once
//! and each resumes exactly once.

use std::sync::{PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};

use uc_core::{AuthGate, ConsentOutcome, ConsentRequest, Credential};

#[derive(Debug)]
enum ConsentReply {
    Granted { access_token: Option<String> },
    Declined,
}

/// A consent request waiting for the user.
///
/// Answering consumes the request. Dropping it unanswered resumes the waiting
/// caller with [`ConsentOutcome::Declined`].
#[derive(Debug)]
pub struct PendingConsent {
    request: ConsentRequest,
    reply: oneshot::Sender<ConsentReply>,
}

impl PendingConsent {
    pub const fn request(&self) -> &ConsentRequest {
        &self.request
    }

    /// Grants consent without changing the credential.
    pub fn grant(self) {
        self.send(ConsentReply::Granted { access_token: None });
    }

    /// Grants consent with the access token issued by the consent flow.
    pub fn grant_with_token(self, access_token: impl Into<String>) {
        self.send(ConsentReply::Granted {
            access_token: Some(access_token.into()),
        });
    }

    pub fn decline(self) {
        self.send(ConsentReply::Declined);
    }

    fn send(self, reply: ConsentReply) {
        if self.reply.send(reply).is_err() {
            tracing::debug!(scope = %self.request.scope, "consent answered after the caller went away");
        }
    }
}

/// Credential holder that suspends callers on interactive consent.
#[derive(Debug)]
pub struct ConsentBroker {
    credential: RwLock<Option<Credential>>,
    requests: mpsc::UnboundedSender<PendingConsent>,
}

impl ConsentBroker {
    /// Creates a broker and the receiver on which consent requests arrive.
    pub fn new(credential: Option<Credential>) -> (Self, mpsc::UnboundedReceiver<PendingConsent>) {
        let (requests, receiver) = mpsc::unbounded_channel();
        let broker = Self {
            credential: RwLock::new(credential),
            requests,
        };
        (broker, receiver)
    }

    /// Replaces the credential (sign-in or sign-out).
    pub fn set_credential(&self, credential: Option<Credential>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }

    fn apply_access_token(&self, access_token: String) {
        let mut guard = self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(credential) => credential.access_token = Some(access_token),
            None => tracing::warn!("consent granted while signed out; token discarded"),
        }
    }
}

impl AuthGate for ConsentBroker {
    fn current_credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn request_consent(&self, request: ConsentRequest) -> ConsentOutcome {
        let (reply, answer) = oneshot::channel();
        tracing::info!(scope = %request.scope, reason = %request.reason, "requesting consent");
        if self.requests.send(PendingConsent { request, reply }).is_err() {
            tracing::warn!("no one is answering consent requests");
            return ConsentOutcome::Declined;
        }

        match answer.await {
            Ok(ConsentReply::Granted { access_token }) => {
                if let Some(token) = access_token {
                    self.apply_access_token(token);
                }
                ConsentOutcome::Granted
            }
            Ok(ConsentReply::Declined) => ConsentOutcome::Declined,
            Err(_) => {
                tracing::warn!("consent request dropped unanswered");
                ConsentOutcome::Declined
            }
        }
    }
}
