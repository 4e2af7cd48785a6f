//! SQLite key/value backend.
//!
//! One `kv` table keyed by record name. Writes are last-write-wins, which is
//! all the consent records need when several tabs share one database.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::backend::KeyValueBackend;
use folio_core::{Error, Result};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);";

/// SQLite-backed [`KeyValueBackend`].
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Open or create the database file at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        info!("SqliteBackend initialized: path={}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl KeyValueBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .prepare_cached("SELECT value FROM kv WHERE key = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![key], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![key, value, now])
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
