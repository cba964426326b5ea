//! App identity resolution and the tracked-app allowlist.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::AppId;

/// Packages that are never tracked even when installed as user apps.
pub const DEFAULT_EXCLUDED_PACKAGES: &[&str] = &[
    "com.google.android.gms",
    "com.android.providers.media",
    "com.google.android.googlequicksearchbox",
    "com.android.systemui",
];

/// What the platform knows about one installed app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app: AppId,
    /// Human-readable label, if the platform has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the app ships with the system image.
    #[serde(default)]
    pub is_system: bool,
}

/// Maps package identifiers to labels and system/user classification.
///
/// This trait allows the allowlist to work with different registries
/// (e.g., the `SQLite` app table in uc-db, or test fixtures).
pub trait AppIdentityResolver {
    /// Every app currently known to be installed.
    fn installed_apps(&self) -> Vec<AppInfo>;

    /// The label for `app`, or `None` if unknown.
    fn display_name(&self, app: &AppId) -> Option<String>;

    /// Whether `app` is a system app. Unknown apps are not system apps.
    fn is_system(&self, app: &AppId) -> bool;
}

/// Builds the set of apps whose usage is tracked: installed user apps that
/// are not in `excluded`.
pub fn tracked_apps<R, S>(resolver: &R, excluded: &[S]) -> HashSet<AppId>
where
    R: AppIdentityResolver + ?Sized,
    S: AsRef<str>,
{
    let excluded: HashSet<&str> = excluded.iter().map(|name| name.as_ref()).collect();
    resolver
        .installed_apps()
        .into_iter()
        .filter(|info| !info.is_system && !excluded.contains(info.app.as_str()))
        .map(|info| info.app)
        .collect()
}

/// The display label for `app`, falling back to the package identifier.
pub fn app_label<R>(resolver: &R, app: &AppId) -> String
where
    R: AppIdentityResolver + ?Sized,
{
    resolver
        .display_name(app)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| app.to_string())
}
