//! Core domain logic for usage-to-calendar sync.
//!
//! This crate contains the fundamental types and logic for:
//! - Reconstruction: turning raw foreground/background events into sessions
//! - Allowlisting: deciding which installed apps are tracked
//! - Collaborator interfaces: usage sources, app identity, and auth consent

pub mod apps;
pub mod auth;
pub mod event;
pub mod reconstruct;
pub mod session;
pub mod source;
pub mod types;

pub use apps::{AppIdentityResolver, AppInfo, DEFAULT_EXCLUDED_PACKAGES, app_label, tracked_apps};
pub use auth::{AuthGate, CALENDAR_SCOPE, ConsentOutcome, ConsentRequest, Credential};
pub use event::{UsageEvent, UsageEventKind};
pub use reconstruct::{ReconstructionState, Reconstructor, Transition, reconstruct_sessions};
pub use session::{CalendarEventHandle, Session, SessionKey};
pub use source::{JsonlUsageSource, LOOKBACK_MS, SourceError, UsageEventSource, lookback_window};
pub use types::{AppId, RemoteEventId, ValidationError};
