//! SQLite-backed key-value store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use medlink_types::{KeyValueStore, StoreError};

use crate::error::{Error, Result};
use crate::schema;

/// SQLite-based [`KeyValueStore`] for pairing records.
///
/// The connection is guarded by a mutex so the store can be shared across
/// threads; every operation is a single statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening pairing database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read a value.
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a value.
    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Delete a value. Returns whether it existed.
    pub fn remove_value(&self, key: &str) -> Result<bool> {
        let removed = self.conn().execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// When a key was last written.
    pub fn updated_at(&self, key: &str) -> Result<Option<OffsetDateTime>> {
        let secs: Option<i64> = self
            .conn()
            .query_row("SELECT updated_at FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(secs.and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok()))
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<i32> {
        schema::get_schema_version(&self.conn())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        Ok(self.get_value(key)?)
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        Ok(self.set_value(key, value)?)
    }

    fn remove(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.remove_value(key)?;
        Ok(())
    }
}
