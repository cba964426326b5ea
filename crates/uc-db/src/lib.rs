//! Storage layer for usage-to-calendar sync.
//!
//! Persists the signed-in account, the registry of installed apps, and the
//! calendar handles that link reconstructed sessions to remote events, using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! - `preferences`: a key-value table holding the account credential
//!   (`account_email`, `account_id_token`, `account_access_token`).
//! - `apps`: package id, display label and system flag for installed apps.
//! - `calendar_handles`: one row per logical session (`package_id`,
//!   `start_ms`) that has been created remotely. Timestamps of the sessions
//!   themselves are epoch milliseconds; `updated_at` is ISO 8601.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use uc_core::{
    AppId, AppIdentityResolver, AppInfo, CalendarEventHandle, Credential, RemoteEventId,
    SessionKey, ValidationError,
};

const KEY_ACCOUNT_EMAIL: &str = "account_email";
const KEY_ACCOUNT_ID_TOKEN: &str = "account_id_token";
const KEY_ACCOUNT_ACCESS_TOKEN: &str = "account_access_token";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored row failed validation.
    #[error("invalid {table} row: {source}")]
    InvalidRecord {
        table: &'static str,
        #[source]
        source: ValidationError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS apps (
                package_id TEXT PRIMARY KEY,
                display_name TEXT,
                is_system INTEGER NOT NULL DEFAULT 0
            );

            -- One row per session that exists remotely.
            -- start_ms: session start, epoch milliseconds
            CREATE TABLE IF NOT EXISTS calendar_handles (
                package_id TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                remote_event_id TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (package_id, start_ms)
            );

            CREATE INDEX IF NOT EXISTS idx_calendar_handles_start ON calendar_handles(start_ms);
            ",
        )?;
        Ok(())
    }

    // ========== Preferences ==========

    fn get_preference(&self, key: &str) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Stores the signed-in account, replacing any previous one.
    pub fn save_credential(&mut self, credential: &Credential) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert =
                tx.prepare("INSERT OR REPLACE INTO preferences (key, value) VALUES (?, ?)")?;
            upsert.execute(params![KEY_ACCOUNT_EMAIL, credential.email])?;
            upsert.execute(params![KEY_ACCOUNT_ID_TOKEN, credential.id_token])?;
            match &credential.access_token {
                Some(token) => {
                    upsert.execute(params![KEY_ACCOUNT_ACCESS_TOKEN, token])?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM preferences WHERE key = ?",
                        [KEY_ACCOUNT_ACCESS_TOKEN],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Loads the stored account, if both email and identity token are present.
    pub fn load_credential(&self) -> Result<Option<Credential>, DbError> {
        let email = self.get_preference(KEY_ACCOUNT_EMAIL)?;
        let id_token = self.get_preference(KEY_ACCOUNT_ID_TOKEN)?;
        let (Some(email), Some(id_token)) = (email, id_token) else {
            return Ok(None);
        };
        let access_token = self.get_preference(KEY_ACCOUNT_ACCESS_TOKEN)?;
        Ok(Some(Credential {
            email,
            id_token,
            access_token,
        }))
    }

    /// Removes the stored account. Returns whether one was stored.
    pub fn clear_credential(&mut self) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM preferences WHERE key IN (?, ?, ?)",
            params![
                KEY_ACCOUNT_EMAIL,
                KEY_ACCOUNT_ID_TOKEN,
                KEY_ACCOUNT_ACCESS_TOKEN
            ],
        )?;
        Ok(removed > 0)
    }

    // ========== Apps ==========

    /// Registers an installed app, replacing any previous entry.
    pub fn upsert_app(&mut self, info: &AppInfo) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO apps (package_id, display_name, is_system) VALUES (?, ?, ?)",
            params![info.app.as_str(), info.display_name, info.is_system],
        )?;
        Ok(())
    }

    /// Removes an app from the registry. Returns whether it was registered.
    pub fn remove_app(&mut self, app: &AppId) -> Result<bool, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM apps WHERE package_id = ?", [app.as_str()])?;
        Ok(removed > 0)
    }

    /// Lists registered apps ordered by package id.
    pub fn list_apps(&self) -> Result<Vec<AppInfo>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT package_id, display_name, is_system FROM apps ORDER BY package_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let package_id: String = row.get(0)?;
            let display_name: Option<String> = row.get(1)?;
            let is_system: bool = row.get(2)?;
            Ok((package_id, display_name, is_system))
        })?;
        let mut apps = Vec::new();
        for row in rows {
            let (package_id, display_name, is_system) = row?;
            apps.push(AppInfo {
                app: parse_app_id("apps", package_id)?,
                display_name,
                is_system,
            });
        }
        Ok(apps)
    }

    fn find_app(&self, app: &AppId) -> Result<Option<AppInfo>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT display_name, is_system FROM apps WHERE package_id = ?",
                [app.as_str()],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(display_name, is_system)| AppInfo {
            app: app.clone(),
            display_name,
            is_system,
        }))
    }

    // ========== Calendar handles ==========

    /// Loads handles for sessions that started at or after `since_ms`.
    pub fn load_handles(&self, since_ms: i64) -> Result<Vec<CalendarEventHandle>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT package_id, start_ms, remote_event_id
            FROM calendar_handles
            WHERE start_ms >= ?
            ORDER BY start_ms ASC, package_id ASC
            ",
        )?;
        let rows = stmt.query_map([since_ms], |row| {
            let package_id: String = row.get(0)?;
            let start_ms: i64 = row.get(1)?;
            let remote_event_id: String = row.get(2)?;
            Ok((package_id, start_ms, remote_event_id))
        })?;
        let mut handles = Vec::new();
        for row in rows {
            let (package_id, start_ms, remote_event_id) = row?;
            let remote_event_id = RemoteEventId::new(remote_event_id).map_err(|source| {
                DbError::InvalidRecord {
                    table: "calendar_handles",
                    source,
                }
            })?;
            handles.push(CalendarEventHandle {
                key: SessionKey {
                    app: parse_app_id("calendar_handles", package_id)?,
                    start_ms,
                },
                remote_event_id: Some(remote_event_id),
            });
        }
        Ok(handles)
    }

    /// Persists handles. Empty handles delete any stored row for their session.
    pub fn save_handles(&mut self, handles: &[CalendarEventHandle]) -> Result<usize, DbError> {
        if handles.is_empty() {
            return Ok(0);
        }
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut upsert = tx.prepare(
                "
                INSERT OR REPLACE INTO calendar_handles
                (package_id, start_ms, remote_event_id, updated_at)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            let mut delete =
                tx.prepare("DELETE FROM calendar_handles WHERE package_id = ? AND start_ms = ?")?;
            for handle in handles {
                written += match &handle.remote_event_id {
                    Some(remote_id) => upsert.execute(params![
                        handle.key.app.as_str(),
                        handle.key.start_ms,
                        remote_id.as_str(),
                        updated_at,
                    ])?,
                    None => delete.execute(params![handle.key.app.as_str(), handle.key.start_ms])?,
                };
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Deletes handles for sessions that started before `before_ms`.
    pub fn prune_handles(&mut self, before_ms: i64) -> Result<usize, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM calendar_handles WHERE start_ms < ?", [before_ms])?;
        Ok(removed)
    }

    /// Counts stored handles.
    pub fn count_handles(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM calendar_handles", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl AppIdentityResolver for Database {
    fn installed_apps(&self) -> Vec<AppInfo> {
        self.list_apps().unwrap_or_else(|err| {
            tracing::warn!(%err, "failed to list installed apps");
            Vec::new()
        })
    }

    fn display_name(&self, app: &AppId) -> Option<String> {
        match self.find_app(app) {
            Ok(info) => info.and_then(|info| info.display_name),
            Err(err) => {
                tracing::warn!(%app, %err, "failed to look up app");
                None
            }
        }
    }

    fn is_system(&self, app: &AppId) -> bool {
        match self.find_app(app) {
            Ok(info) => info.is_some_and(|info| info.is_system),
            Err(err) => {
                tracing::warn!(%app, %err, "failed to look up app");
                false
            }
        }
    }
}

fn parse_app_id(table: &'static str, package_id: String) -> Result<AppId, DbError> {
    AppId::new(package_id).map_err(|source| DbError::InvalidRecord { table, source })
}
