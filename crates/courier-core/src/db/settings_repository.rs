//! Settings repository implementation

use crate::error::Result;
use crate::models::{SyncMode, SyncSettings};
use rusqlite::{params, Connection, OptionalExtension};

const KEY_SYNC_ENABLED: &str = "sync_enabled";
const KEY_SYNC_MODE: &str = "sync_mode";
const KEY_SYNC_ENABLED_SINCE: &str = "sync_enabled_since";
const KEY_DESTINATION_ID: &str = "destination_id";
const KEY_LAST_FULL_SYNC_AT: &str = "last_full_sync_at";

/// Trait for sync settings storage operations
pub trait SettingsRepository {
    /// Load settings from the database
    fn load(&self) -> Result<SyncSettings>;

    /// Save settings to the database
    fn save(&self, settings: &SyncSettings) -> Result<()>;

    /// Switch the sync mode, recording the opt-in time the first time
    /// `NEW_ONLY` is chosen
    fn set_sync_mode(&self, mode: SyncMode, now: i64) -> Result<SyncSettings>;

    /// Record the completion time of a full pass
    fn set_last_full_sync_at(&self, at: i64) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load(&self) -> Result<SyncSettings> {
        let mut settings = SyncSettings::default();

        if let Some(value) = self.get_setting(KEY_SYNC_ENABLED)? {
            settings.sync_enabled = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(value) = self.get_setting(KEY_SYNC_MODE)? {
            settings.sync_mode = value.parse().unwrap_or_default();
        }

        if let Some(value) = self.get_setting(KEY_SYNC_ENABLED_SINCE)? {
            settings.sync_enabled_since = value.trim().parse().ok();
        }

        settings.destination_id =
            crate::util::normalize_text_option(self.get_setting(KEY_DESTINATION_ID)?);

        if let Some(value) = self.get_setting(KEY_LAST_FULL_SYNC_AT)? {
            settings.last_full_sync_at = value.trim().parse().ok();
        }

        Ok(settings)
    }

    fn save(&self, settings: &SyncSettings) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.set_setting(
            KEY_SYNC_ENABLED,
            if settings.sync_enabled { "true" } else { "false" },
        )?;
        self.set_setting(KEY_SYNC_MODE, settings.sync_mode.as_str())?;
        self.set_optional(
            KEY_SYNC_ENABLED_SINCE,
            settings.sync_enabled_since.map(|v| v.to_string()),
        )?;
        self.set_optional(KEY_DESTINATION_ID, settings.destination_id.clone())?;
        self.set_optional(
            KEY_LAST_FULL_SYNC_AT,
            settings.last_full_sync_at.map(|v| v.to_string()),
        )?;
        tx.commit()?;
        Ok(())
    }

    fn set_sync_mode(&self, mode: SyncMode, now: i64) -> Result<SyncSettings> {
        let mut settings = self.load()?;
        settings.sync_mode = mode;
        if mode == SyncMode::NewOnly && settings.sync_enabled_since.is_none() {
            settings.sync_enabled_since = Some(now);
            tracing::info!(since = now, "Recorded NEW_ONLY opt-in time");
        }
        self.save(&settings)?;
        Ok(settings)
    }

    fn set_last_full_sync_at(&self, at: i64) -> Result<()> {
        self.set_setting(KEY_LAST_FULL_SYNC_AT, &at.to_string())
    }
}

impl SqliteSettingsRepository<'_> {
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn set_optional(&self, key: &str, value: Option<String>) -> Result<()> {
        match value {
            Some(value) => self.set_setting(key, &value),
            None => {
                self.conn
                    .execute("DELETE FROM settings WHERE key = ?", params![key])?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_load_default_settings() {
        let db = setup();
        let repo = SqliteSettingsRepository::new(db.connection());

        let settings = repo.load().unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn test_save_and_load_settings() {
        let db = setup();
        let repo = SqliteSettingsRepository::new(db.connection());

        let settings = SyncSettings {
            sync_enabled: true,
            sync_mode: SyncMode::NewOnly,
            sync_enabled_since: Some(1_700_000_000_000),
            destination_id: Some("-1001234".to_string()),
            last_full_sync_at: Some(1_700_000_100_000),
        };

        repo.save(&settings).unwrap();
        assert_eq!(repo.load().unwrap(), settings);

        let cleared = SyncSettings {
            destination_id: None,
            ..settings
        };
        repo.save(&cleared).unwrap();
        assert_eq!(repo.load().unwrap().destination_id, None);
    }

    #[test]
    fn test_new_only_opt_in_time_is_set_once() {
        let db = setup();
        let repo = SqliteSettingsRepository::new(db.connection());

        let settings = repo.set_sync_mode(SyncMode::NewOnly, 1_000).unwrap();
        assert_eq!(settings.sync_enabled_since, Some(1_000));

        repo.set_sync_mode(SyncMode::All, 2_000).unwrap();
        let settings = repo.set_sync_mode(SyncMode::NewOnly, 3_000).unwrap();
        assert_eq!(settings.sync_enabled_since, Some(1_000));
        assert_eq!(settings.watermark(), Some(1_000));
    }

    #[test]
    fn test_blank_destination_is_unset() {
        let db = setup();
        let repo = SqliteSettingsRepository::new(db.connection());

        repo.set_setting(KEY_DESTINATION_ID, "   ").unwrap();
        assert_eq!(repo.load().unwrap().destination_id, None);
    }

    #[test]
    fn test_set_last_full_sync_at() {
        let db = setup();
        let repo = SqliteSettingsRepository::new(db.connection());

        repo.set_last_full_sync_at(42).unwrap();
        assert_eq!(repo.load().unwrap().last_full_sync_at, Some(42));
    }
}
