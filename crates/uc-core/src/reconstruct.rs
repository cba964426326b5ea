//! Session reconstruction from raw usage events.
//!
//! Converts a chronological stream of [`UsageEvent`]s into non-overlapping
//! [`Session`]s for a set of tracked apps.
//!
//! # Algorithm Summary
//!
//! A single pass with constant state:
//!
//! 1. Events for untracked apps are skipped entirely.
//! 2. A foreground event for the active app is a continuation: after a
//!    background dip (flicker) the dip is absorbed, and a repeated foreground
//!    event is ignored.
//! 3. A foreground event for any other app closes the active session, at the
//!    switch timestamp if it was still in the foreground or at its background
//!    timestamp otherwise, and opens a new one.
//! 4. A background event for the active foreground app ends the session
//!    tentatively. It is only emitted once confirmed, so a later flicker back
//!    to the same app extends it instead of producing a second session.
//! 5. At stream end the active session is closed at `now`, or at its
//!    tentative end if it had moved to the background.

use std::collections::HashSet;

use crate::event::{UsageEvent, UsageEventKind};
use crate::session::Session;
use crate::types::AppId;

/// The most recent transition observed for the active app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    None,
    EnteredForeground,
    EnteredBackground,
}

/// Scratch state carried across one reconstruction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructionState {
    /// App whose session is open (or tentatively closed).
    pub active_app: Option<AppId>,
    /// When the active session started.
    pub active_start_ms: Option<i64>,
    /// Background timestamp of a tentatively closed session.
    pub tentative_end_ms: Option<i64>,
    pub last_transition: Transition,
}

/// Streaming session reconstructor.
///
/// Feed events in ascending timestamp order with [`Reconstructor::push`] and
/// close the pass with [`Reconstructor::finish`].
#[derive(Debug)]
pub struct Reconstructor<'a> {
    tracked: &'a HashSet<AppId>,
    state: ReconstructionState,
}

impl<'a> Reconstructor<'a> {
    pub fn new(tracked: &'a HashSet<AppId>) -> Self {
        Self {
            tracked,
            state: ReconstructionState::default(),
        }
    }

    pub const fn state(&self) -> &ReconstructionState {
        &self.state
    }

    /// Applies one event, returning a session if the event closed one.
    pub fn push(&mut self, event: &UsageEvent) -> Option<Session> {
        if !self.tracked.contains(&event.app) {
            return None;
        }

        match event.kind {
            UsageEventKind::Foreground => self.on_foreground(event),
            UsageEventKind::Background => {
                self.on_background(event);
                None
            }
            UsageEventKind::Other => None,
        }
    }

    /// Ends the pass, closing any session still open at `now_ms`.
    pub fn finish(mut self, now_ms: i64) -> Option<Session> {
        self.close_active(now_ms)
    }

    fn on_foreground(&mut self, event: &UsageEvent) -> Option<Session> {
        let same_app = self.state.active_app.as_ref() == Some(&event.app);
        if same_app {
            match self.state.last_transition {
                Transition::EnteredBackground => {
                    tracing::debug!(app = %event.app, at = event.timestamp_ms, "absorbing flicker");
                    self.state.tentative_end_ms = None;
                    self.state.last_transition = Transition::EnteredForeground;
                    return None;
                }
                Transition::EnteredForeground => return None,
                Transition::None => {}
            }
        }

        let closed = self.close_active(event.timestamp_ms);
        self.state = ReconstructionState {
            active_app: Some(event.app.clone()),
            active_start_ms: Some(event.timestamp_ms),
            tentative_end_ms: None,
            last_transition: Transition::EnteredForeground,
        };
        closed
    }

    fn on_background(&mut self, event: &UsageEvent) {
        let same_app = self.state.active_app.as_ref() == Some(&event.app);
        if same_app && self.state.last_transition == Transition::EnteredForeground {
            self.state.tentative_end_ms = Some(event.timestamp_ms);
            self.state.last_transition = Transition::EnteredBackground;
        } else {
            tracing::trace!(app = %event.app, at = event.timestamp_ms, "ignoring unmatched background event");
        }
    }

    fn close_active(&mut self, at_ms: i64) -> Option<Session> {
        let state = std::mem::take(&mut self.state);
        let (Some(app), Some(start_ms)) = (state.active_app, state.active_start_ms) else {
            return None;
        };
        let end_ms = match state.last_transition {
            Transition::EnteredForeground => at_ms,
            Transition::EnteredBackground => state.tentative_end_ms?,
            Transition::None => return None,
        };

        match Session::new(app, start_ms, end_ms) {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::debug!(%err, "skipping empty session");
                None
            }
        }
    }
}

/// Reconstructs all sessions for `events`, closing any open session at `now_ms`.
///
/// Events must be sorted by timestamp ascending; ties keep their stream order.
pub fn reconstruct_sessions<'e, I>(events: I, tracked: &HashSet<AppId>, now_ms: i64) -> Vec<Session>
where
    I: IntoIterator<Item = &'e UsageEvent>,
{
    let mut reconstructor = Reconstructor::new(tracked);
    let mut sessions: Vec<Session> = events
        .into_iter()
        .filter_map(|event| reconstructor.push(event))
        .collect();
    sessions.extend(reconstructor.finish(now_ms));
    sessions
}
