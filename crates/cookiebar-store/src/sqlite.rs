//! SQLite connection management and the options table.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::schema::{CONSENT_LOGS_TABLE, OPTIONS_SCHEMA_SQL};
use cookiebar_core::{Error, Result};

/// SQLite store holding the options table and the consent log.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the SQLite store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/cookiebar.db`.
    /// Only the options table is created here; the consent log is created on demand.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("cookiebar.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(OPTIONS_SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "SqliteStore initialized: consent table {}, path={}",
            if store.table_exists() { "present" } else { "absent" },
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether the consent log table exists. Storage errors read as `false`.
    pub fn table_exists(&self) -> bool {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![CONSENT_LOGS_TABLE],
                |_| Ok(()),
            )
            .optional();
        match found {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("table_exists check failed: {}", e);
                false
            }
        }
    }

    // ---------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------

    /// Read a named option and deserialize it. A row that no longer parses
    /// as `T` is treated as missing.
    pub fn get_option<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .prepare_cached("SELECT value FROM options WHERE name = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![name], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Option '{}' is not valid for its type: {}", name, e);
                None
            }
        }))
    }

    /// Insert or replace a named option.
    pub fn update_option<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![name, json, now])
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a named option. Returns true if it existed.
    pub fn delete_option(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM options WHERE name = ?1", params![name])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }
}
