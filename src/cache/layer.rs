//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::entry::{CacheEntry, CacheResult};
use super::memory::MemoryTier;

/// The surface a fetch layer uses to read, revalidate and write back cached
/// values.
///
/// Everything here goes through the in-memory tier; the durable tier is only
/// touched by the [`Synchronizer`](super::Synchronizer) at lifecycle
/// boundaries.
pub struct CacheLayer {
  memory: Arc<MemoryTier>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl CacheLayer {
  /// Create a new cache layer over the given memory tier.
  pub fn new(memory: Arc<MemoryTier>) -> Self {
    Self {
      memory,
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, entry: &CacheEntry) -> bool {
    Utc::now() - entry.cached_at > self.stale_time
  }

  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    self.memory.get(key)
  }

  /// Write a value, stamped with the current time.
  pub fn set(&self, key: &str, data: Value) {
    self.memory.set(key, CacheEntry::new(data));
  }

  pub fn delete(&self, key: &str) {
    self.memory.delete(key);
  }

  pub fn subscribe(&self, key: &str) -> watch::Receiver<Option<CacheEntry>> {
    self.memory.subscribe(key)
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return stale cache (offline mode)
  /// 4. Update cache with new data
  pub async fn fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<Value>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    let Some(cached) = self.memory.get(key) else {
      // No cache, must fetch from network
      debug!(key, "Cache miss");
      return self.revalidate(key, fetcher).await;
    };

    if !self.is_stale(&cached) {
      return Ok(CacheResult::from_cache(cached.data, cached.cached_at));
    }

    // Cache is stale, try to fetch from network
    match fetcher().await {
      Ok(data) => {
        self.set(key, data.clone());
        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        debug!(key, error = %e, "Revalidation failed, serving stale entry");
        Ok(CacheResult::offline(cached.data, cached.cached_at))
      }
    }
  }

  /// Always fetch from network and write the result back.
  pub async fn revalidate<F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<Value>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    let data = fetcher().await?;
    self.set(key, data.clone());
    Ok(CacheResult::from_network(data))
  }

  /// Typed variant of [`fetch`](Self::fetch).
  pub async fn fetch_as<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let result = self
      .fetch(key, || async {
        let value = fetcher().await?;
        let json =
          serde_json::to_value(value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
        Ok::<Value, color_eyre::Report>(json)
      })
      .await?;

    let data = serde_json::from_value(result.data.clone())
      .map_err(|e| eyre!("Cached value for {} has an unexpected shape: {}", key, e))?;
    Ok(result.map(|_| data))
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      memory: Arc::clone(&self.memory),
      stale_time: self.stale_time,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use serde::Deserialize;
  use serde_json::json;

  fn layer() -> CacheLayer {
    CacheLayer::new(Arc::new(MemoryTier::new()))
  }

  fn stale_entry(data: Value) -> CacheEntry {
    CacheEntry::with_cached_at(data, Utc::now() - Duration::hours(1))
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores() {
    let cache = layer();
    let result = cache
      .fetch("/posts", || async { Ok(json!([1, 2])) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(cache.get("/posts").map(|e| e.data), Some(json!([1, 2])));
  }

  #[tokio::test]
  async fn test_miss_propagates_fetch_error() {
    let cache = layer();
    let result = cache
      .fetch("/posts", || async { Err(eyre!("offline")) })
      .await;

    assert!(result.is_err());
    assert!(cache.get("/posts").is_none());
  }

  #[tokio::test]
  async fn test_fresh_hit_skips_fetcher() {
    let cache = layer();
    cache.set("/user", json!({"name": "ada"}));

    let result = cache
      .fetch("/user", || async { Err(eyre!("fetcher must not run for fresh data")) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(result.data, json!({"name": "ada"}));
  }

  #[tokio::test]
  async fn test_stale_hit_revalidates() {
    let memory = Arc::new(MemoryTier::new());
    memory.set("/feed", stale_entry(json!("old")));
    let cache = CacheLayer::new(Arc::clone(&memory));

    let result = cache
      .fetch("/feed", || async { Ok(json!("new")) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(memory.get("/feed").map(|e| e.data), Some(json!("new")));
  }

  #[tokio::test]
  async fn test_stale_hit_serves_offline_on_failure() {
    let memory = Arc::new(MemoryTier::new());
    memory.set("/feed", stale_entry(json!("old")));
    let cache = CacheLayer::new(Arc::clone(&memory));

    let result = cache
      .fetch("/feed", || async { Err(eyre!("connection refused")) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, json!("old"));
    assert_eq!(memory.get("/feed").map(|e| e.data), Some(json!("old")));
  }

  #[tokio::test]
  async fn test_subscriber_observes_revalidation() {
    let cache = layer().with_stale_time(Duration::zero());
    let rx = cache.subscribe("/n");

    cache.revalidate("/n", || async { Ok(json!(7)) }).await.unwrap();
    assert_eq!(rx.borrow().as_ref().map(|e| e.data.clone()), Some(json!(7)));
  }

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Post {
    id: u64,
    title: String,
  }

  #[tokio::test]
  async fn test_fetch_as_roundtrips_types() {
    let cache = layer();
    let post = cache
      .fetch_as("/post/1", || async {
        Ok(Post {
          id: 1,
          title: "hi".to_string(),
        })
      })
      .await
      .unwrap();
    assert_eq!(post.data.title, "hi");

    let again: CacheResult<Post> = cache
      .fetch_as("/post/1", || async { Err(eyre!("unused")) })
      .await
      .unwrap();
    assert_eq!(again.source, CacheSource::CacheFresh);
    assert_eq!(again.data, post.data);
  }

  #[tokio::test]
  async fn test_fetch_as_rejects_mismatched_shape() {
    let cache = layer();
    cache.set("/post/2", json!("not a post"));

    let result: Result<CacheResult<Post>> = cache
      .fetch_as("/post/2", || async { Err(eyre!("unused")) })
      .await;
    assert!(result.is_err());
  }
}
