//! In-memory tier: the shared, observable key/value map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::entry::CacheEntry;

/// Outcome of merging a snapshot into the tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
  /// Keys that were absent and got inserted
  pub inserted: usize,
  /// Keys that already existed and were left untouched
  pub kept: usize,
}

#[derive(Default)]
struct Inner {
  entries: HashMap<String, CacheEntry>,
  watchers: HashMap<String, watch::Sender<Option<CacheEntry>>>,
}

impl Inner {
  /// Push the current value of `key` to its watchers, dropping the channel
  /// once every receiver is gone.
  fn notify(&mut self, key: &str) {
    let Some(tx) = self.watchers.get(key) else {
      return;
    };
    if tx.receiver_count() == 0 {
      self.watchers.remove(key);
      return;
    }
    tx.send_replace(self.entries.get(key).cloned());
  }
}

/// Volatile cache tier held in process memory.
///
/// All operations are total: they never fail and never block on I/O. One
/// coarse lock guards both the entries and the per-key watchers, so a
/// notification is always sent in the same order as the writes it reports.
#[derive(Default)]
pub struct MemoryTier {
  inner: Mutex<Inner>,
}

impl MemoryTier {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // A panic while holding the lock cannot leave a half-applied insert
    // behind, so a poisoned map is still consistent.
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get the current value for `key`.
  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    self.lock().entries.get(key).cloned()
  }

  /// Insert or replace the value for `key` and notify its subscribers.
  pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
    let key = key.into();
    let mut inner = self.lock();
    inner.entries.insert(key.clone(), entry);
    inner.notify(&key);
  }

  /// Remove `key` if present, returning the removed entry.
  pub fn delete(&self, key: &str) -> Option<CacheEntry> {
    let mut inner = self.lock();
    let removed = inner.entries.remove(key);
    if removed.is_some() {
      inner.notify(key);
    }
    removed
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.lock().entries.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().entries.is_empty()
  }

  /// All keys, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.lock().entries.keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Point-in-time copy of every entry, sorted by key.
  ///
  /// The copy is detached from the tier: later writes do not show up in it.
  pub fn entries(&self) -> Vec<(String, CacheEntry)> {
    let mut entries: Vec<(String, CacheEntry)> = self
      .lock()
      .entries
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
  }

  /// Insert every entry whose key is not already present.
  ///
  /// Existing keys always win. The whole merge happens under one lock
  /// acquisition, so a concurrent `set` is either seen (and kept) or
  /// applied afterwards (and overwrites the merged value).
  pub fn insert_missing(&self, entries: impl IntoIterator<Item = (String, CacheEntry)>) -> MergeStats {
    let mut stats = MergeStats::default();
    let mut inner = self.lock();

    for (key, entry) in entries {
      if inner.entries.contains_key(&key) {
        stats.kept += 1;
        continue;
      }
      inner.entries.insert(key.clone(), entry);
      inner.notify(&key);
      stats.inserted += 1;
    }

    stats
  }

  /// Watch `key`. The receiver starts with the current value and sees every
  /// later write or delete of that key.
  pub fn subscribe(&self, key: &str) -> watch::Receiver<Option<CacheEntry>> {
    let mut inner = self.lock();
    // Keys that are never written again would otherwise keep dead senders
    inner.watchers.retain(|_, tx| tx.receiver_count() > 0);

    let current = inner.entries.get(key).cloned();
    match inner.watchers.get(key) {
      Some(tx) => tx.subscribe(),
      None => {
        let (tx, rx) = watch::channel(current);
        inner.watchers.insert(key.to_string(), tx);
        rx
      }
    }
  }
}

impl std::fmt::Debug for MemoryTier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryTier")
      .field("len", &self.len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::Arc;

  fn entry(v: serde_json::Value) -> CacheEntry {
    CacheEntry::new(v)
  }

  #[test]
  fn test_set_then_get() {
    let tier = MemoryTier::new();
    assert!(tier.get("a").is_none());

    tier.set("a", entry(json!(1)));
    assert_eq!(tier.get("a").map(|e| e.data), Some(json!(1)));

    tier.set("a", entry(json!(2)));
    assert_eq!(tier.get("a").map(|e| e.data), Some(json!(2)));
    assert_eq!(tier.len(), 1);
  }

  #[test]
  fn test_delete_missing_is_noop() {
    let tier = MemoryTier::new();
    assert!(tier.delete("nope").is_none());

    tier.set("a", entry(json!("x")));
    assert!(tier.delete("a").is_some());
    assert!(tier.is_empty());
  }

  #[test]
  fn test_entries_is_a_detached_snapshot() {
    let tier = MemoryTier::new();
    tier.set("b", entry(json!(2)));
    tier.set("a", entry(json!(1)));

    let snapshot = tier.entries();
    tier.set("c", entry(json!(3)));
    tier.delete("a");

    let keys: Vec<&str> = snapshot.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
  }

  #[test]
  fn test_insert_missing_keeps_existing() {
    let tier = MemoryTier::new();
    tier.set("k", entry(json!("v1")));

    let stats = tier.insert_missing(vec![
      ("k".to_string(), entry(json!("v2"))),
      ("k2".to_string(), entry(json!("v3"))),
    ]);

    assert_eq!(stats, MergeStats { inserted: 1, kept: 1 });
    assert_eq!(tier.get("k").map(|e| e.data), Some(json!("v1")));
    assert_eq!(tier.get("k2").map(|e| e.data), Some(json!("v3")));
  }

  #[test]
  fn test_subscriber_sees_writes_and_deletes() {
    let tier = MemoryTier::new();
    tier.set("k", entry(json!(1)));

    let mut rx = tier.subscribe("k");
    assert_eq!(rx.borrow().as_ref().map(|e| e.data.clone()), Some(json!(1)));

    tier.set("k", entry(json!(2)));
    assert!(rx.has_changed().unwrap());
    assert_eq!(
      rx.borrow_and_update().as_ref().map(|e| e.data.clone()),
      Some(json!(2))
    );

    tier.delete("k");
    assert!(rx.borrow_and_update().is_none());
  }

  #[test]
  fn test_subscriber_sees_rehydrated_insert() {
    let tier = MemoryTier::new();
    let rx = tier.subscribe("later");
    assert!(rx.borrow().is_none());

    tier.insert_missing(vec![("later".to_string(), entry(json!(true)))]);
    assert_eq!(rx.borrow().as_ref().map(|e| e.data.clone()), Some(json!(true)));
  }

  #[test]
  fn test_dropped_watchers_are_pruned() {
    let tier = MemoryTier::new();
    drop(tier.subscribe("k"));
    tier.set("k", entry(json!(1)));
    assert!(tier.lock().watchers.is_empty());
  }

  #[test]
  fn test_subscribe_prunes_abandoned_watchers() {
    let tier = MemoryTier::new();
    drop(tier.subscribe("never-written"));
    let _rx = tier.subscribe("other");

    let inner = tier.lock();
    assert!(!inner.watchers.contains_key("never-written"));
    assert!(inner.watchers.contains_key("other"));
  }

  #[test]
  fn test_concurrent_sets_lose_nothing() {
    let tier = Arc::new(MemoryTier::new());
    let handles: Vec<_> = (0..16)
      .map(|t| {
        let tier = Arc::clone(&tier);
        std::thread::spawn(move || {
          for i in 0..50 {
            tier.set(format!("{t}:{i}"), CacheEntry::new(json!(i)));
          }
        })
      })
      .collect();

    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(tier.entries().len(), 16 * 50);
  }
}
