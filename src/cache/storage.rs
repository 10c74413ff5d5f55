//! Durable store trait and its file, SQLite and no-op implementations.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to {op} snapshot at {}: {source}", .path.display())]
  Io {
    op: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("sqlite snapshot store: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("invalid storage key '{0}'")]
  InvalidKey(String),
  #[error("snapshot store lock poisoned")]
  Poisoned,
}

impl StoreError {
  fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
    Self::Io {
      op,
      path: path.to_path_buf(),
      source,
    }
  }
}

/// A single named blob in persistent storage.
///
/// Implementations may block on I/O; callers on an async runtime should run
/// them on a blocking thread.
pub trait DurableStore: Send + Sync {
  /// Read the stored blob, or `None` if nothing has been written yet.
  fn read(&self) -> Result<Option<Vec<u8>>, StoreError>;

  /// Replace the stored blob. A crash part-way through must leave either the
  /// previous blob or the new one readable, never a mix.
  fn write(&self, bytes: &[u8]) -> Result<(), StoreError>;

  /// Remove the stored blob. Removing a missing blob is not an error.
  fn clear(&self) -> Result<(), StoreError>;

  /// Human-readable location, for logs and the CLI.
  fn describe(&self) -> String;
}

/// Reject keys that would escape the storage directory or collide with the
/// temp file naming.
fn validate_key(key: &str) -> Result<(), StoreError> {
  let ok = !key.is_empty()
    && key != "."
    && key != ".."
    && !key.ends_with(".tmp")
    && key
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if ok {
    Ok(())
  } else {
    Err(StoreError::InvalidKey(key.to_string()))
  }
}

/// Store used when persistence is disabled - all operations are no-ops.
pub struct NoopStore;

impl DurableStore for NoopStore {
  fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(None) // Always first run
  }

  fn write(&self, _bytes: &[u8]) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn clear(&self) -> Result<(), StoreError> {
    Ok(())
  }

  fn describe(&self) -> String {
    "disabled".to_string()
  }
}

/// Snapshot kept in a single file, replaced via write-to-temp-then-rename.
#[derive(Debug, Clone)]
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  /// Open the store for `storage_key` inside `dir`, creating `dir` if needed.
  pub fn open(dir: &Path, storage_key: &str) -> Result<Self, StoreError> {
    validate_key(storage_key)?;
    fs::create_dir_all(dir).map_err(|e| StoreError::io("create directory for", dir, e))?;

    Ok(Self {
      path: dir.join(format!("{}.snapshot", storage_key)),
    })
  }

  /// Path of the snapshot file.
  pub fn path(&self) -> &Path {
    &self.path
  }

  fn temp_path(&self) -> PathBuf {
    self.path.with_extension("snapshot.tmp")
  }
}

impl DurableStore for FileStore {
  fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(&self.path) {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(StoreError::io("read", &self.path, e)),
    }
  }

  fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = self.temp_path();

    let staged = write_temp(&temp_path, bytes).and_then(|()| {
      fs::rename(&temp_path, &self.path).map_err(|e| StoreError::io("rename", &self.path, e))
    });
    if let Err(e) = staged {
      // Best effort: the original error is what gets reported
      let _ = fs::remove_file(&temp_path);
      return Err(e);
    }

    // Persist the rename itself
    #[cfg(unix)]
    {
      if let Some(parent) = self.path.parent() {
        File::open(parent)
          .and_then(|dir| dir.sync_all())
          .map_err(|e| StoreError::io("sync directory of", &self.path, e))?;
      }
    }

    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    for path in [self.path.clone(), self.temp_path()] {
      match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::io("remove", &path, e)),
      }
    }
    Ok(())
  }

  fn describe(&self) -> String {
    self.path.display().to_string()
  }
}

/// Fully write and flush `bytes` to `path` before it can replace the snapshot.
fn write_temp(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
  let mut file =
    File::create(path).map_err(|e| StoreError::io("create temp file for", path, e))?;
  file
    .write_all(bytes)
    .map_err(|e| StoreError::io("write", path, e))?;
  file.sync_all().map_err(|e| StoreError::io("sync", path, e))
}

/// Schema for the snapshot table.
const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    storage_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Snapshot kept as one row of a SQLite database.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  storage_key: String,
  location: String,
}

impl SqliteStore {
  /// Open (or create) `<dir>/cache.db` and use the row named `storage_key`.
  pub fn open(dir: &Path, storage_key: &str) -> Result<Self, StoreError> {
    validate_key(storage_key)?;
    fs::create_dir_all(dir).map_err(|e| StoreError::io("create directory for", dir, e))?;

    let path = dir.join("cache.db");
    let conn = Connection::open(&path)?;
    Self::with_connection(conn, storage_key, path.display().to_string())
  }

  /// Open a private in-memory database.
  pub fn open_in_memory(storage_key: &str) -> Result<Self, StoreError> {
    validate_key(storage_key)?;
    let conn = Connection::open_in_memory()?;
    Self::with_connection(conn, storage_key, ":memory:".to_string())
  }

  fn with_connection(
    conn: Connection,
    storage_key: &str,
    location: String,
  ) -> Result<Self, StoreError> {
    conn.execute_batch(SNAPSHOT_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
      storage_key: storage_key.to_string(),
      location,
    })
  }
}

impl DurableStore for SqliteStore {
  fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    let data = conn
      .query_row(
        "SELECT data FROM snapshots WHERE storage_key = ?",
        params![self.storage_key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(data)
  }

  fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    // Single statement, so SQLite applies it atomically
    conn.execute(
      "INSERT OR REPLACE INTO snapshots (storage_key, data, written_at)
       VALUES (?, ?, datetime('now'))",
      params![self.storage_key, bytes],
    )?;
    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    conn.execute(
      "DELETE FROM snapshots WHERE storage_key = ?",
      params![self.storage_key],
    )?;
    Ok(())
  }

  fn describe(&self) -> String {
    format!("{} ({})", self.location, self.storage_key)
  }
}
