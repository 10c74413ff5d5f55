//! Two-tier cache: a volatile in-memory map mirrored to durable storage at
//! lifecycle boundaries.
//!
//! - The in-memory tier serves every read and write from the fetch layer
//! - The durable tier holds one versioned snapshot of the in-memory tier
//! - The synchronizer writes that snapshot on suspend and merges it back on
//!   resume, with in-memory values always taking precedence

pub mod codec;
mod entry;
mod layer;
mod memory;
mod storage;
mod sync;

pub use codec::{DecodeError, EncodeError};
pub use entry::{CacheEntry, CacheResult, CacheSource};
pub use layer::CacheLayer;
pub use memory::{MemoryTier, MergeStats};
pub use storage::{DurableStore, FileStore, NoopStore, SqliteStore, StoreError};
pub use sync::{SyncError, SyncErrorKind, SyncPhase, SyncReport, Synchronizer};
