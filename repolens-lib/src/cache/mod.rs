//! Two-tier cache for pull request data.
//!
//! A bounded in-process [`MemoryCache`] sits in front of a persistent, hash-sharded [`FileCache`].
//! [`CacheManager`] reads through both tiers, promotes file hits into memory, writes through to
//! both, and keeps running statistics.

mod cache_lock;
mod cleanup_task;
mod clock;
mod entry;
mod file;
pub mod keys;
mod manager;
mod memory;

pub use cache_lock::{CacheLockGuard, acquire_cache_lock};
pub use cleanup_task::CleanupTask;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, SCHEMA_VERSION};
pub use file::{FileCache, FileCacheStats, FileCleanupReport};
pub use manager::{CacheManager, CacheManagerStats, Cacheable, CleanupSummary, SetOptions, TierStats};
pub use memory::{MemoryCache, MemoryCacheStats};
