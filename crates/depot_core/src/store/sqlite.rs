//! SQLite backend for the durable store

use super::DurableStore;
use depot_common::{DepotError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY NOT NULL,
    value      BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// One row per key in a single `kv` table
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a SQLite database
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file; parent dirs are created
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            DepotError::Storage(format!("Failed to open database at {:?}: {}", path, e))
        })?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;

        tracing::info!("SQLite store opened at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(storage_err)
    }

    fn write_batch(&self, writes: &[(String, Option<Vec<u8>>)]) -> Result<()> {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let mut conn = self.lock();
        let tx = conn.transaction().map_err(storage_err)?;
        for (key, value) in writes {
            let changed = match value {
                Some(bytes) => tx.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, bytes, updated_at],
                ),
                None => tx.execute("DELETE FROM kv WHERE key = ?1", [key]),
            };
            changed.map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM kv ORDER BY key")
            .map_err(storage_err)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(keys)
    }
}

fn storage_err(e: rusqlite::Error) -> DepotError {
    DepotError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_upsert_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write_batch(&[
                ("a".to_string(), Some(b"1".to_vec())),
                ("b".to_string(), Some(b"2".to_vec())),
            ])
            .unwrap();
        store
            .write_batch(&[
                ("a".to_string(), Some(b"3".to_vec())),
                ("b".to_string(), None),
            ])
            .unwrap();

        assert_eq!(store.read("a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.read("b").unwrap(), None);
        assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/depot.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .write_batch(&[("sync_queue".to_string(), Some(b"[]".to_vec()))])
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read("sync_queue").unwrap(), Some(b"[]".to_vec()));
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
