//! Cache storage trait with SQLite and in-memory implementations.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use super::record::{CacheRecord, ResourceKey, ResourceKind};
use crate::error::StoreError;

/// Trait for cache storage backends.
///
/// Every operation is atomic per key. Writes to the same key resolve
/// last-write-wins in call order.
pub trait CacheStorage: Send + Sync {
  /// Read the record stored for a key.
  fn read(&self, key: &ResourceKey) -> Result<Option<CacheRecord>, StoreError>;

  /// Insert or overwrite the record for `record.key`.
  fn write(&self, record: &CacheRecord) -> Result<(), StoreError>;

  /// Remove a single record. Removing a missing key is not an error.
  fn delete(&self, key: &ResourceKey) -> Result<(), StoreError>;

  /// Keys currently stored for one kind, in sub-id order.
  fn keys(&self, kind: ResourceKind) -> Result<Vec<ResourceKey>, StoreError>;

  /// Remove every record of one kind.
  fn delete_kind(&self, kind: ResourceKind) -> Result<(), StoreError>;

  /// Remove every record.
  fn clear(&self) -> Result<(), StoreError>;
}

/// Volatile storage, used when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  records: RwLock<HashMap<ResourceKey, CacheRecord>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn read(&self, key: &ResourceKey) -> Result<Option<CacheRecord>, StoreError> {
    let records = self.records.read().unwrap_or_else(|e| e.into_inner());
    Ok(records.get(key).cloned())
  }

  fn write(&self, record: &CacheRecord) -> Result<(), StoreError> {
    let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
    records.insert(record.key.clone(), record.clone());
    Ok(())
  }

  fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
    let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
    records.remove(key);
    Ok(())
  }

  fn keys(&self, kind: ResourceKind) -> Result<Vec<ResourceKey>, StoreError> {
    let records = self.records.read().unwrap_or_else(|e| e.into_inner());
    let mut keys: Vec<ResourceKey> = records
      .keys()
      .filter(|key| key.kind() == kind)
      .cloned()
      .collect();
    keys.sort();
    Ok(keys)
  }

  fn delete_kind(&self, kind: ResourceKind) -> Result<(), StoreError> {
    let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
    records.retain(|key, _| key.kind() != kind);
    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
    records.clear();
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::CacheIo(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::CacheIo(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    // WAL keeps readers from waiting on a writer; the pragma returns a row.
    conn
      .query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
      .map_err(|e| StoreError::CacheIo(format!("Failed to enable WAL: {}", e)))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives as long as this value.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("hydra").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<(), StoreError> {
    self
      .conn()
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| StoreError::CacheIo(format!("Failed to run cache migrations: {}", e)))
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    // A panic mid-statement leaves SQLite itself consistent.
    self.conn.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Schema for cache tables. `sub_id` is '' for keys without sub-identifier.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_records (
    kind TEXT NOT NULL,
    sub_id TEXT NOT NULL,
    payload BLOB NOT NULL,
    fetched_at TEXT NOT NULL,
    version TEXT,
    PRIMARY KEY (kind, sub_id)
);
"#;

impl CacheStorage for SqliteStorage {
  fn read(&self, key: &ResourceKey) -> Result<Option<CacheRecord>, StoreError> {
    let conn = self.conn();

    let row: Option<(Vec<u8>, String, Option<String>)> = conn
      .query_row(
        "SELECT payload, fetched_at, version FROM cache_records
         WHERE kind = ? AND sub_id = ?",
        params![key.kind().slug(), key.sub_id().unwrap_or("")],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| StoreError::CacheIo(format!("Failed to read {}: {}", key, e)))?;

    match row {
      Some((payload, fetched_at, version)) => Ok(Some(CacheRecord {
        key: key.clone(),
        payload,
        fetched_at: parse_datetime(&fetched_at)?,
        version,
      })),
      None => Ok(None),
    }
  }

  fn write(&self, record: &CacheRecord) -> Result<(), StoreError> {
    let key = &record.key;
    self
      .conn()
      .execute(
        "INSERT OR REPLACE INTO cache_records (kind, sub_id, payload, fetched_at, version)
         VALUES (?, ?, ?, ?, ?)",
        params![
          key.kind().slug(),
          key.sub_id().unwrap_or(""),
          record.payload,
          format_datetime(record.fetched_at),
          record.version,
        ],
      )
      .map_err(|e| StoreError::CacheIo(format!("Failed to store {}: {}", key, e)))?;

    Ok(())
  }

  fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
    self
      .conn()
      .execute(
        "DELETE FROM cache_records WHERE kind = ? AND sub_id = ?",
        params![key.kind().slug(), key.sub_id().unwrap_or("")],
      )
      .map_err(|e| StoreError::CacheIo(format!("Failed to delete {}: {}", key, e)))?;

    Ok(())
  }

  fn keys(&self, kind: ResourceKind) -> Result<Vec<ResourceKey>, StoreError> {
    let conn = self.conn();
    let mut stmt = conn.prepare("SELECT sub_id FROM cache_records WHERE kind = ? ORDER BY sub_id")?;

    let keys = stmt
      .query_map(params![kind.slug()], |row| row.get::<_, String>(0))?
      .collect::<Result<Vec<_>, _>>()?
      .into_iter()
      .map(|sub_id| {
        if sub_id.is_empty() {
          ResourceKey::kind_only(kind)
        } else {
          ResourceKey::with_id(kind, sub_id)
        }
      })
      .collect();

    Ok(keys)
  }

  fn delete_kind(&self, kind: ResourceKind) -> Result<(), StoreError> {
    self
      .conn()
      .execute(
        "DELETE FROM cache_records WHERE kind = ?",
        params![kind.slug()],
      )
      .map_err(|e| StoreError::CacheIo(format!("Failed to delete {} records: {}", kind, e)))?;

    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    self
      .conn()
      .execute("DELETE FROM cache_records", [])
      .map_err(|e| StoreError::CacheIo(format!("Failed to clear cache: {}", e)))?;

    Ok(())
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a timestamp as written by `format_datetime`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| StoreError::CacheIo(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn record(sub_id: &str, payload: &[u8]) -> CacheRecord {
    CacheRecord {
      key: ResourceKey::with_id(ResourceKind::RestoMenu, sub_id),
      payload: payload.to_vec(),
      fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
        + chrono::Duration::nanoseconds(123_456_789),
      version: Some("\"v1\"".to_string()),
    }
  }

  fn exercise(storage: &dyn CacheStorage) {
    let first = record("2024-05-01", b"{\"open\":true}");
    let second = record("2024-05-02", b"{\"open\":false}");

    assert_eq!(storage.read(&first.key).unwrap(), None);

    storage.write(&first).unwrap();
    storage.write(&second).unwrap();
    assert_eq!(storage.read(&first.key).unwrap(), Some(first.clone()));

    // Overwrite, not append
    let mut updated = first.clone();
    updated.payload = b"{\"open\":false}".to_vec();
    updated.version = None;
    storage.write(&updated).unwrap();
    assert_eq!(storage.read(&first.key).unwrap(), Some(updated));

    storage.delete(&first.key).unwrap();
    assert_eq!(storage.read(&first.key).unwrap(), None);
    assert!(storage.read(&second.key).unwrap().is_some());

    let other_kind = CacheRecord {
      key: ResourceKey::kind_only(ResourceKind::Association),
      ..second.clone()
    };
    storage.write(&other_kind).unwrap();
    storage.delete_kind(ResourceKind::RestoMenu).unwrap();
    assert_eq!(storage.read(&second.key).unwrap(), None);
    assert!(storage.read(&other_kind.key).unwrap().is_some());
    storage.write(&second).unwrap();

    storage.clear().unwrap();
    assert_eq!(storage.read(&second.key).unwrap(), None);
  }

  #[test]
  fn test_memory_storage() {
    exercise(&MemoryStorage::new());
  }

  #[test]
  fn test_sqlite_storage() {
    exercise(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_key_without_sub_id() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let record = CacheRecord {
      key: ResourceKey::kind_only(ResourceKind::Association),
      payload: b"[]".to_vec(),
      fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
      version: None,
    };
    storage.write(&record).unwrap();

    assert_eq!(storage.read(&record.key).unwrap(), Some(record.clone()));
    assert_eq!(
      storage.keys(ResourceKind::Association).unwrap(),
      vec![record.key.clone()]
    );
    assert!(storage.keys(ResourceKind::RestoMenu).unwrap().is_empty());
  }

  #[test]
  fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let record = record("2024-05-01", b"{\"meals\":[]}");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.write(&record).unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    assert_eq!(storage.read(&record.key).unwrap(), Some(record));
  }

  #[test]
  fn test_parse_datetime_rejects_garbage() {
    assert!(matches!(
      parse_datetime("yesterday"),
      Err(StoreError::CacheIo(_))
    ));
  }
}
