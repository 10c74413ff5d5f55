//! Lifecycle synchronizer: snapshot on suspend, rehydrate on resume.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::codec::{self, DecodeError, EncodeError};
use super::entry::CacheEntry;
use super::memory::MemoryTier;
use super::storage::{DurableStore, StoreError};

type LoadResult = Result<Option<Vec<(String, CacheEntry)>>, SyncError>;

/// Any failure the synchronizer catches at its boundary.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Encode(#[from] EncodeError),
  #[error(transparent)]
  Decode(#[from] DecodeError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("snapshot storage task failed: {0}")]
  Task(String),
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
  Encode,
  Decode,
  Io,
}

impl SyncError {
  pub fn kind(&self) -> SyncErrorKind {
    match self {
      Self::Encode(_) => SyncErrorKind::Encode,
      Self::Decode(_) => SyncErrorKind::Decode,
      Self::Store(_) | Self::Task(_) => SyncErrorKind::Io,
    }
  }
}

/// Which lifecycle hook produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
  Suspend,
  Resume,
}

impl std::fmt::Display for SyncPhase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Suspend => f.write_str("suspend"),
      Self::Resume => f.write_str("resume"),
    }
  }
}

/// Outcome of a lifecycle hook. Hooks never fail; failures are reported here.
#[derive(Debug, Clone)]
pub enum SyncReport {
  /// Snapshot written
  Persisted { entries: usize, bytes: usize },
  /// Snapshot merged into memory
  Rehydrated { inserted: usize, kept: usize },
  /// Nothing persisted yet, memory left as is
  NoSnapshot,
  /// The hook gave up; memory is untouched and the durable tier is ignored
  Failed {
    phase: SyncPhase,
    error: Arc<SyncError>,
  },
}

impl SyncReport {
  fn failed(phase: SyncPhase, error: SyncError) -> Self {
    Self::Failed {
      phase,
      error: Arc::new(error),
    }
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, Self::Failed { .. })
  }

  /// The failure kind, if this report is a failure.
  pub fn error_kind(&self) -> Option<SyncErrorKind> {
    match self {
      Self::Failed { error, .. } => Some(error.kind()),
      _ => None,
    }
  }
}

impl std::fmt::Display for SyncReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Persisted { entries, bytes } => {
        write!(f, "persisted {} entries ({} bytes)", entries, bytes)
      }
      Self::Rehydrated { inserted, kept } => {
        write!(f, "rehydrated {} entries ({} kept from memory)", inserted, kept)
      }
      Self::NoSnapshot => f.write_str("no snapshot to rehydrate"),
      Self::Failed { phase, error } => write!(f, "{} failed: {}", phase, error),
    }
  }
}

/// Orchestrates the in-memory tier and the durable store across lifecycle
/// transitions.
///
/// The synchronizer keeps no state between hooks apart from the last report
/// it published. A gate lets at most one hook run at a time, so a resume can
/// never interleave with the snapshot taken by a suspend. The memory tier
/// stays readable and writable by everyone else throughout: its lock is only
/// held while copying entries out or merging them in, never across I/O.
pub struct Synchronizer {
  memory: Arc<MemoryTier>,
  store: Arc<dyn DurableStore>,
  gate: Arc<Mutex<()>>,
  reports: watch::Sender<Option<SyncReport>>,
}

impl Synchronizer {
  pub fn new(memory: Arc<MemoryTier>, store: Arc<dyn DurableStore>) -> Self {
    let (reports, _) = watch::channel(None);
    Self {
      memory,
      store,
      gate: Arc::new(Mutex::new(())),
      reports,
    }
  }

  pub fn memory(&self) -> &Arc<MemoryTier> {
    &self.memory
  }

  /// Location of the durable tier, for display.
  pub fn store_location(&self) -> String {
    self.store.describe()
  }

  /// Watch the most recent report from either hook.
  pub fn reports(&self) -> watch::Receiver<Option<SyncReport>> {
    self.reports.subscribe()
  }

  /// Snapshot the in-memory tier into durable storage.
  #[tracing::instrument(skip(self))]
  pub async fn on_suspend(&self) -> SyncReport {
    let gate = Arc::clone(&self.gate).lock_owned().await;
    let started = Instant::now();

    // Copy out under the memory lock, which is released before any I/O
    let entries = self.memory.entries();
    let count = entries.len();

    let report = match self.persist(gate, entries).await {
      Ok(bytes) => {
        info!(
          entries = count,
          bytes,
          elapsed_ms = started.elapsed().as_millis() as u64,
          "Cache snapshot persisted"
        );
        SyncReport::Persisted {
          entries: count,
          bytes,
        }
      }
      Err(e) => {
        error!(error = %e, kind = ?e.kind(), "Cache snapshot failed, keeping previous snapshot");
        SyncReport::failed(SyncPhase::Suspend, e)
      }
    };

    self.publish(report)
  }

  /// Merge the durable snapshot into the in-memory tier. Keys already in
  /// memory are never overwritten.
  #[tracing::instrument(skip(self))]
  pub async fn on_resume(&self) -> SyncReport {
    let gate = Arc::clone(&self.gate).lock_owned().await;
    let started = Instant::now();

    let (_gate, loaded) = self.load(gate).await;
    let report = match loaded {
      Ok(None) => {
        debug!("No cache snapshot found");
        SyncReport::NoSnapshot
      }
      Ok(Some(entries)) => {
        let stats = self.memory.insert_missing(entries);
        info!(
          inserted = stats.inserted,
          kept = stats.kept,
          elapsed_ms = started.elapsed().as_millis() as u64,
          "Cache rehydrated"
        );
        SyncReport::Rehydrated {
          inserted: stats.inserted,
          kept: stats.kept,
        }
      }
      Err(e) => {
        match e.kind() {
          SyncErrorKind::Decode => {
            warn!(error = %e, "Discarding unreadable cache snapshot")
          }
          _ => error!(error = %e, kind = ?e.kind(), "Cache rehydrate failed"),
        }
        SyncReport::failed(SyncPhase::Resume, e)
      }
    };

    self.publish(report)
  }

  /// The gate moves into the blocking task, so a cancelled hook keeps it
  /// until the write has finished.
  async fn persist(
    &self,
    gate: OwnedMutexGuard<()>,
    entries: Vec<(String, CacheEntry)>,
  ) -> Result<usize, SyncError> {
    let store = Arc::clone(&self.store);
    tokio::task::spawn_blocking(move || {
      let _gate = gate;
      write_snapshot(store.as_ref(), &entries)
    })
    .await
    .map_err(|e| SyncError::Task(e.to_string()))?
  }

  /// Like [`persist`](Self::persist), but hands the gate back so the merge
  /// into memory still runs under it.
  async fn load(&self, gate: OwnedMutexGuard<()>) -> (Option<OwnedMutexGuard<()>>, LoadResult) {
    let store = Arc::clone(&self.store);
    let task = tokio::task::spawn_blocking(move || {
      let result = read_snapshot(store.as_ref());
      (gate, result)
    });

    match task.await {
      Ok((gate, result)) => (Some(gate), result),
      Err(e) => (None, Err(SyncError::Task(e.to_string()))),
    }
  }

  fn publish(&self, report: SyncReport) -> SyncReport {
    self.reports.send_replace(Some(report.clone()));
    report
  }
}

fn write_snapshot(
  store: &dyn DurableStore,
  entries: &[(String, CacheEntry)],
) -> Result<usize, SyncError> {
  let bytes = codec::encode(entries)?;
  store.write(&bytes)?;
  Ok(bytes.len())
}

fn read_snapshot(store: &dyn DurableStore) -> LoadResult {
  let Some(bytes) = store.read()? else {
    return Ok(None);
  };
  // Decode fully before touching memory; a bad blob is dropped whole
  Ok(Some(codec::decode(&bytes)?))
}
