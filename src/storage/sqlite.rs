// src/storage/sqlite.rs — SQLite-backed key-value storage

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::Storage;
use crate::infra::errors::EchoError;

/// Stores state blobs in a single `kv` table.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, EchoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, EchoError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, EchoError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EchoError> {
        self.conn
            .lock()
            .map_err(|_| EchoError::Storage("sqlite connection lock poisoned".into()))
    }
}

impl Storage for SqliteStorage {
    fn save(&self, key: &str, blob: &str) -> Result<(), EchoError> {
        let now = Utc::now().to_rfc3339();
        self.lock()?.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, blob, now],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, EchoError> {
        let value = self
            .lock()?
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }
}
