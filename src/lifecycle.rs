//! Host lifecycle observer.
//!
//! The cache does not detect visibility changes itself. Whatever hosts it
//! (a terminal focus handler, a mobile runtime bridge, a signal handler)
//! feeds [`LifecycleEvent`]s into a [`LifecycleObserver`], which forwards real
//! transitions to the [`Synchronizer`].

use std::sync::Arc;

use tracing::debug;

use crate::cache::{SyncReport, Synchronizer};

/// A visibility change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  /// The application is no longer visible
  Background,
  /// The application became visible
  Foreground,
}

/// Last known visibility of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
  Active,
  Background,
}

impl std::fmt::Display for AppState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Active => f.write_str("active"),
      Self::Background => f.write_str("background"),
    }
  }
}

/// Turns host lifecycle events into synchronizer calls.
///
/// Hosts often report the same state more than once (focus events repeat,
/// launch and the first foreground coincide), so only transitions are
/// forwarded. The observer starts out in [`AppState::Background`]: the first
/// `Foreground` is the launch and rehydrates the cache.
pub struct LifecycleObserver {
  sync: Arc<Synchronizer>,
  state: AppState,
}

impl LifecycleObserver {
  pub fn new(sync: Arc<Synchronizer>) -> Self {
    Self {
      sync,
      state: AppState::Background,
    }
  }

  pub fn state(&self) -> AppState {
    self.state
  }

  pub fn synchronizer(&self) -> &Arc<Synchronizer> {
    &self.sync
  }

  /// Handle an event. Returns the sync report if the event was a transition.
  pub async fn handle(&mut self, event: LifecycleEvent) -> Option<SyncReport> {
    match event {
      LifecycleEvent::Background => self.on_background().await,
      LifecycleEvent::Foreground => self.on_foreground().await,
    }
  }

  /// The application moved to the background: persist the in-memory tier.
  pub async fn on_background(&mut self) -> Option<SyncReport> {
    if self.state == AppState::Background {
      debug!("Already in background, skipping snapshot");
      return None;
    }
    self.state = AppState::Background;
    Some(self.sync.on_suspend().await)
  }

  /// The application came to the foreground: rehydrate from durable storage.
  pub async fn on_foreground(&mut self) -> Option<SyncReport> {
    if self.state == AppState::Active {
      debug!("Already active, skipping rehydrate");
      return None;
    }
    self.state = AppState::Active;
    Some(self.sync.on_resume().await)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheEntry, MemoryTier, NoopStore};
  use serde_json::json;

  fn observer() -> LifecycleObserver {
    let sync = Synchronizer::new(Arc::new(MemoryTier::new()), Arc::new(NoopStore));
    LifecycleObserver::new(Arc::new(sync))
  }

  #[tokio::test]
  async fn test_launch_rehydrates() {
    let mut obs = observer();
    assert_eq!(obs.state(), AppState::Background);

    let report = obs.handle(LifecycleEvent::Foreground).await;
    assert!(matches!(report, Some(SyncReport::NoSnapshot)));
    assert_eq!(obs.state(), AppState::Active);
  }

  #[tokio::test]
  async fn test_repeated_events_are_ignored() {
    let mut obs = observer();
    obs.synchronizer().memory().set("k", CacheEntry::new(json!(1)));

    assert!(obs.handle(LifecycleEvent::Foreground).await.is_some());
    assert!(obs.handle(LifecycleEvent::Foreground).await.is_none());

    assert!(matches!(
      obs.handle(LifecycleEvent::Background).await,
      Some(SyncReport::Persisted { entries: 1, .. })
    ));
    assert!(obs.handle(LifecycleEvent::Background).await.is_none());
    assert_eq!(obs.state(), AppState::Background);
  }

  #[tokio::test]
  async fn test_background_before_launch_is_ignored() {
    let mut obs = observer();
    assert!(obs.on_background().await.is_none());
  }
}
