//! Hybrid cache that keeps a fast in-memory tier and mirrors it to durable
//! storage whenever the host application is suspended, rehydrating on resume.
//!
//! The pieces, leaf to root:
//! - [`cache::codec`] encodes tier snapshots into a versioned, checksummed blob
//! - [`cache::DurableStore`] persists that blob (file or SQLite backed)
//! - [`cache::MemoryTier`] is the shared, observable key/value map
//! - [`cache::Synchronizer`] runs snapshot-on-suspend / rehydrate-on-resume
//! - [`cache::CacheLayer`] is the surface a fetch layer reads and writes through
//! - [`lifecycle::LifecycleObserver`] turns host visibility changes into sync calls

pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod logging;
