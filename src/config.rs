use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{DurableStore, FileStore, NoopStore, SqliteStore};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Custom title for the header (defaults to "rehydrate")
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  /// One snapshot file, replaced atomically
  #[default]
  File,
  /// One row in a SQLite database
  Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Persist the in-memory tier when the app is backgrounded
  pub persist: bool,
  pub backend: StoreBackend,
  /// Directory holding the durable tier
  pub dir: Option<PathBuf>,
  /// Name of the snapshot within the durable tier
  pub storage_key: String,
  /// Seconds before a cached value is revalidated
  pub stale_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persist: true,
      backend: StoreBackend::File,
      dir: None,
      storage_key: "cache".to_string(),
      stale_secs: 300,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter directive, overridden by RUST_LOG
  pub level: String,
  /// Log file name, relative to the cache directory
  pub file: PathBuf,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: PathBuf::from("rehydrate.log"),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rehydrate.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rehydrate/config.yaml
  ///
  /// Without a config file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rehydrate.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rehydrate").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    // A bare `~` document also means "all defaults"
    let config: Option<Config> = serde_yaml::from_str(contents)?;
    let config = config.unwrap_or_default();
    config.cache.validate()?;
    Ok(config)
  }
}

impl CacheConfig {
  /// Resolve the cache directory.
  ///
  /// Uses the configured dir, then REHYDRATE_CACHE_DIR, then the platform
  /// data directory.
  pub fn resolve_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.dir {
      return Ok(dir.clone());
    }
    if let Ok(dir) = std::env::var("REHYDRATE_CACHE_DIR") {
      return Ok(PathBuf::from(dir));
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("rehydrate"))
  }

  /// Open the durable tier described by this config.
  pub fn open_store(&self) -> Result<Arc<dyn DurableStore>> {
    if !self.persist {
      return Ok(Arc::new(NoopStore));
    }

    let dir = self.resolve_dir()?;
    let store: Arc<dyn DurableStore> = match self.backend {
      StoreBackend::File => Arc::new(
        FileStore::open(&dir, &self.storage_key)
          .map_err(|e| eyre!("Failed to open snapshot file in {}: {}", dir.display(), e))?,
      ),
      StoreBackend::Sqlite => Arc::new(
        SqliteStore::open(&dir, &self.storage_key)
          .map_err(|e| eyre!("Failed to open snapshot database in {}: {}", dir.display(), e))?,
      ),
    };
    Ok(store)
  }

  /// Reject values that cannot be used at runtime.
  fn validate(&self) -> Result<()> {
    if Self::checked_stale_time(self.stale_secs).is_none() {
      return Err(eyre!(
        "cache.stale_secs is out of range: {} (max {})",
        self.stale_secs,
        chrono::Duration::MAX.num_seconds()
      ));
    }
    Ok(())
  }

  fn checked_stale_time(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
  }

  /// Saturates at the largest representable duration; `parse` rejects
  /// anything beyond it.
  pub fn stale_time(&self) -> chrono::Duration {
    Self::checked_stale_time(self.stale_secs).unwrap_or(chrono::Duration::MAX)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert!(config.cache.persist);
    assert_eq!(config.cache.backend, StoreBackend::File);
    assert_eq!(config.cache.storage_key, "cache");
    assert_eq!(config.logging.level, "info");
  }

  #[test]
  fn test_partial_cache_section() {
    let config = Config::parse("cache:\n  backend: sqlite\n  stale_secs: 30\n").unwrap();
    assert_eq!(config.cache.backend, StoreBackend::Sqlite);
    assert_eq!(config.cache.stale_time(), chrono::Duration::seconds(30));
    assert_eq!(config.cache.storage_key, "cache");
  }

  #[test]
  fn test_out_of_range_stale_secs_is_rejected() {
    let err = Config::parse("cache:\n  stale_secs: 10000000000000000\n").unwrap_err();
    assert!(err.to_string().contains("stale_secs"));

    let cache = CacheConfig {
      stale_secs: u64::MAX,
      ..CacheConfig::default()
    };
    assert_eq!(cache.stale_time(), chrono::Duration::MAX);
  }

  #[test]
  fn test_unknown_backend_is_rejected() {
    assert!(Config::parse("cache:\n  backend: floppy\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
  }

  #[test]
  fn test_open_store_per_backend() {
    let dir = TempDir::new().unwrap();
    let mut cache = CacheConfig {
      dir: Some(dir.path().to_path_buf()),
      ..CacheConfig::default()
    };

    let file = cache.open_store().unwrap();
    assert!(file.describe().ends_with("cache.snapshot"));

    cache.backend = StoreBackend::Sqlite;
    assert!(cache.open_store().unwrap().describe().contains("cache.db"));

    cache.persist = false;
    assert_eq!(cache.open_store().unwrap().describe(), "disabled");
  }
}
