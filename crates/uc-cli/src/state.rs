//! Application state passed explicitly to commands.

use anyhow::{Context, Result};

use uc_calendar::GoogleCalendarClient;
use uc_core::{Credential, JsonlUsageSource};
use uc_db::Database;

use crate::Config;

/// The signed-in account and loaded configuration.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Config,
    pub account: Option<Credential>,
}

impl AppState {
    /// Restores the stored account, the silent re-authentication step.
    pub fn load(db: &Database, config: Config) -> Result<Self> {
        let account = db
            .load_credential()
            .context("failed to load stored account")?;
        if let Some(account) = &account {
            tracing::debug!(email = %account.email, "restored account");
        }
        Ok(Self { config, account })
    }

    pub fn usage_source(&self) -> JsonlUsageSource {
        JsonlUsageSource::new(&self.config.events_path)
    }

    pub fn calendar_client(&self) -> Result<GoogleCalendarClient> {
        GoogleCalendarClient::new(
            &self.config.calendar_api_base,
            self.config.calendar_id.clone(),
        )
        .context("failed to create calendar client")
    }
}
