//! Calendar side of usage sync.
//!
//! - [`client`]: the [`CalendarClient`] trait and event payloads
//! - [`google`]: Google Calendar REST implementation
//! - [`consent`]: interactive consent broker implementing `AuthGate`
//! - [`sequencer`]: serialized create-or-extend of events per session

pub mod client;
pub mod consent;
pub mod google;
pub mod sequencer;

pub use client::{CalendarClient, CalendarError, NewCalendarEvent, RemoteEvent};
pub use consent::{ConsentBroker, PendingConsent};
pub use google::{DEFAULT_API_BASE, GoogleCalendarClient, PRIMARY_CALENDAR};
pub use sequencer::{PassReport, UpsertError, UpsertOutcome, UpsertRequest, UpsertSequencer};
