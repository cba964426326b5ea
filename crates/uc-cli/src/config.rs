//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use uc_calendar::{DEFAULT_API_BASE, PRIMARY_CALENDAR};
use uc_core::DEFAULT_EXCLUDED_PACKAGES;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// JSON-lines usage log read by `sessions` and `sync`.
    pub events_path: PathBuf,
    /// Calendar that receives usage events.
    pub calendar_id: String,
    /// Base URL of the Calendar v3 REST API.
    pub calendar_api_base: String,
    /// Packages never tracked, even when installed as user apps.
    pub excluded_packages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("uc.db"),
            events_path: data_dir.join("usage.jsonl"),
            calendar_id: PRIMARY_CALENDAR.to_string(),
            calendar_api_base: DEFAULT_API_BASE.to_string(),
            excluded_packages: DEFAULT_EXCLUDED_PACKAGES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // UC_DATABASE_PATH, UC_EVENTS_PATH, ...
        figment = figment.merge(Env::prefixed("UC_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for uc.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("uc"))
}

/// Returns the platform-specific data directory for uc.
///
/// On Linux: `~/.local/share/uc`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("uc"))
}
