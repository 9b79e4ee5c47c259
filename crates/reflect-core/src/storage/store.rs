//! SQLite-backed local store.
//!
//! The device copy of the two collections (`goals`, `logs`) lives here as
//! JSON documents in a key/value table, next to a handful of small string
//! keys (notification fallback, auth session, undo snapshot, device id).
//!
//! Each write replaces one document in a single statement, so a collection is
//! either fully written or left at its previous value.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, migrations};
use crate::error::StorageError;
use crate::model::{DayLog, Goal};

/// The two synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Goals,
    Logs,
}

impl Collection {
    /// Storage key of the collection document.
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Goals => "r_goals",
            Collection::Logs => "r_logs",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Goals => "goals",
            Collection::Logs => "logs",
        }
    }
}

/// On-device store.
///
/// The connection sits behind a mutex so the store can be shared with
/// background sync tasks; all access is short and synchronous.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open the store at `~/.config/reflect/reflect.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()?.join("reflect.db");
        Self::open_at(&path)
    }

    /// Open (or create) the store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store (tests, dry runs).
    pub fn open_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-written row behind.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a raw value from the kv table.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a raw value in the kv table.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), StorageError> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Read and decode a JSON document.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.kv_get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Encoding {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Encode and write a JSON document. Encoding happens before the write,
    /// so a failure leaves the stored value untouched.
    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Encoding {
            key: key.to_string(),
            source,
        })?;
        self.kv_set(key, &raw)
    }

    /// Read a collection. Missing or unreadable documents yield an empty list.
    pub fn get<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        match self.read_json::<Vec<T>>(collection.key()) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(collection = collection.name(), error = %e, "falling back to empty collection");
                Vec::new()
            }
        }
    }

    /// Replace a collection. Returns false (and keeps the previous value)
    /// when the write fails.
    pub fn set<T: Serialize>(&self, collection: Collection, records: &[T]) -> bool {
        match self.write_json(collection.key(), records) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(collection = collection.name(), error = %e, "local write lost");
                false
            }
        }
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.get(Collection::Goals)
    }

    pub fn logs(&self) -> Vec<DayLog> {
        self.get(Collection::Logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn kv_store() {
        let store = LocalStore::open_memory().unwrap();
        assert!(store.kv_get("test").unwrap().is_none());
        store.kv_set("test", "value").unwrap();
        assert_eq!(store.kv_get("test").unwrap().as_deref(), Some("value"));
        store.kv_delete("test").unwrap();
        assert!(store.kv_get("test").unwrap().is_none());
    }

    #[test]
    fn collections_round_trip_and_are_visible_immediately() {
        let store = LocalStore::open_memory().unwrap();
        assert!(store.goals().is_empty());

        let goals = vec![Goal::new("Read 12 books", "Q1-2025")];
        assert!(store.set(Collection::Goals, &goals));
        assert_eq!(store.goals(), goals);

        let logs = vec![DayLog::new(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap())];
        assert!(store.set(Collection::Logs, &logs));
        assert_eq!(store.logs(), logs);
    }

    #[test]
    fn corrupt_document_reads_as_empty() {
        let store = LocalStore::open_memory().unwrap();
        store.kv_set(Collection::Goals.key(), "{not json").unwrap();
        assert!(store.goals().is_empty());
        assert!(matches!(
            store.read_json::<Vec<Goal>>(Collection::Goals.key()),
            Err(StorageError::Encoding { .. })
        ));
    }

    #[test]
    fn failed_encoding_keeps_previous_value() {
        use std::collections::HashMap;

        let store = LocalStore::open_memory().unwrap();
        let goals = vec![Goal::new("Keep me", "Q1-2025")];
        assert!(store.set(Collection::Goals, &goals));

        // JSON object keys must be strings; tuple keys fail to encode.
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        assert!(!store.set(Collection::Goals, &[bad]));
        assert_eq!(store.goals(), goals);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reflect.db");
        {
            let store = LocalStore::open_at(&path).unwrap();
            assert!(store.set(Collection::Goals, &[Goal::new("Durable", "Q2-2025")]));
        }
        let store = LocalStore::open_at(&path).unwrap();
        assert_eq!(store.goals()[0].name, "Durable");
    }
}
