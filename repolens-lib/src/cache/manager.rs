use super::cleanup_task::CleanupTask;
use super::clock::Clock;
use super::file::{FileCache, FileCleanupReport, FileCacheStats};
use super::keys;
use super::memory::{MemoryCache, MemoryCacheStats};
use crate::config::CacheSettings;
use crate::errors::CacheError;
use crate::model::{DataSource, ProcessedPullRequest, PullRequest};
use core::time::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Log target for the cache manager
const LOG_TARGET: &str = "     cache";

/// Values that can live in both tiers.
pub trait Cacheable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Per-write overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub memory_ttl: Option<Duration>,
    pub file_ttl: Option<Duration>,
    pub memory_only: bool,
    pub file_only: bool,
}

/// Counters for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

/// Running statistics of a [`CacheManager`]. Counters reset only on [`CacheManager::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheManagerStats {
    pub enabled: bool,
    pub lookups: u64,
    pub memory: TierStats,
    pub file: TierStats,
    pub hit_rate: f64,
    pub average_latency_ms: f64,
    pub memory_cache: Option<MemoryCacheStats>,
}

/// Outcome of [`CacheManager::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub memory_removed: usize,
    pub file: FileCleanupReport,
}

#[derive(Debug, Default)]
struct Counters {
    lookups: u64,
    memory: TierStats,
    file: TierStats,
    operations: u64,
    total_latency: Duration,
}

impl Counters {
    fn record_latency(&mut self, started: Instant) {
        self.operations += 1;
        self.total_latency += started.elapsed();
    }
}

#[derive(Debug)]
struct Tiers {
    memory: Arc<MemoryCache>,
    file: Arc<FileCache>,
}

/// Front door to the memory and file cache tiers.
///
/// Reads try memory first and fall back to disk, promoting disk hits into memory. Writes go to
/// both tiers. Read failures degrade to misses; write failures are returned to the caller.
#[derive(Debug)]
pub struct CacheManager {
    tiers: Option<Tiers>,
    memory_ttl: Duration,
    file_ttl: Duration,
    incremental: bool,
    cleanup_interval: Duration,
    clock: Arc<dyn Clock>,
    counters: Mutex<Counters>,
    cleanup_task: Mutex<Option<CleanupTask>>,
}

impl CacheManager {
    /// Builds both tiers. With caching disabled nothing touches the disk and every lookup misses.
    pub fn new(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let tiers = if settings.enabled {
            let memory = MemoryCache::new(settings.memory_max_entries, settings.memory_ttl, Arc::clone(&clock));
            let file = FileCache::new(&settings.directory, settings.max_size_bytes(), settings.ttl, Arc::clone(&clock))?
                .with_cleanup_probability(settings.cleanup_probability);
            Some(Tiers {
                memory: Arc::new(memory),
                file: Arc::new(file),
            })
        } else {
            log::debug!(target: LOG_TARGET, "Caching is disabled");
            None
        };

        Ok(Self {
            tiers,
            memory_ttl: settings.memory_ttl,
            file_ttl: settings.ttl,
            incremental: settings.incremental,
            cleanup_interval: settings.cleanup_interval,
            clock,
            counters: Mutex::new(Counters::default()),
            cleanup_task: Mutex::new(None),
        })
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.tiers.is_some()
    }

    #[must_use]
    pub const fn is_incremental(&self) -> bool {
        self.incremental
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.file_ttl
    }

    pub fn get<T: Cacheable>(&self, key: &str) -> Option<T> {
        self.get_with_source(key).map(|(value, _)| value)
    }

    /// Looks a key up in memory, then on disk, reporting which tier answered.
    pub fn get_with_source<T: Cacheable>(&self, key: &str) -> Option<(T, DataSource)> {
        let tiers = self.tiers.as_ref()?;
        let started = Instant::now();

        let from_memory = tiers.memory.get::<T>(key);
        let mut counters = self.counters.lock().expect("lock poisoned");
        counters.lookups += 1;

        if let Some(value) = from_memory {
            counters.memory.hits += 1;
            counters.record_latency(started);
            return Some((value, DataSource::MemoryCache));
        }
        counters.memory.misses += 1;
        drop(counters);

        let from_file = tiers.file.get::<T>(key);
        let mut counters = self.counters.lock().expect("lock poisoned");
        let result = match from_file {
            Ok(Some(value)) => {
                counters.file.hits += 1;
                tiers.memory.set(key, value.clone(), Some(self.memory_ttl));
                counters.memory.writes += 1;
                log::trace!(target: LOG_TARGET, "Promoted '{key}' into memory");
                Some((value, DataSource::FileCache))
            }
            Ok(None) => {
                counters.file.misses += 1;
                None
            }
            Err(e) => {
                counters.file.errors += 1;
                counters.file.misses += 1;
                log::debug!(target: LOG_TARGET, "Treating unreadable cache entry '{key}' as a miss: {e}");
                None
            }
        };

        counters.record_latency(started);
        result
    }

    /// Writes a value to both tiers unless `options` restricts it to one.
    pub fn set<T: Cacheable>(&self, key: &str, value: &T, options: SetOptions) -> Result<(), CacheError> {
        let Some(tiers) = self.tiers.as_ref() else {
            return Ok(());
        };
        let started = Instant::now();

        if !options.file_only {
            tiers.memory.set(key, value.clone(), Some(options.memory_ttl.unwrap_or(self.memory_ttl)));
            self.counters.lock().expect("lock poisoned").memory.writes += 1;
        }

        if !options.memory_only {
            let written = tiers.file.set(key, value, Some(options.file_ttl.unwrap_or(self.file_ttl)));
            let mut counters = self.counters.lock().expect("lock poisoned");
            match written {
                Ok(()) => counters.file.writes += 1,
                Err(e) => {
                    counters.file.errors += 1;
                    return Err(e);
                }
            }
        }

        self.counters.lock().expect("lock poisoned").record_latency(started);
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.tiers.as_ref().is_some_and(|tiers| tiers.memory.has(key) || tiers.file.has(key))
    }

    /// Removes a key from both tiers, returning whether either held it.
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let Some(tiers) = self.tiers.as_ref() else {
            return Ok(false);
        };
        let in_memory = tiers.memory.delete(key);
        let on_disk = tiers.file.delete(key)?;
        Ok(in_memory || on_disk)
    }

    /// Empties both tiers and resets the statistics.
    pub fn clear(&self) -> Result<(), CacheError> {
        if let Some(tiers) = self.tiers.as_ref() {
            tiers.memory.clear();
            tiers.file.clear()?;
        }
        *self.counters.lock().expect("lock poisoned") = Counters::default();
        Ok(())
    }

    /// Sweeps expired entries from both tiers and enforces the disk size bound.
    pub fn cleanup(&self) -> Result<CleanupSummary, CacheError> {
        let Some(tiers) = self.tiers.as_ref() else {
            return Ok(CleanupSummary::default());
        };
        Ok(CleanupSummary {
            memory_removed: tiers.memory.cleanup(),
            file: tiers.file.cleanup()?,
        })
    }

    #[must_use]
    pub fn stats(&self) -> CacheManagerStats {
        let counters = self.counters.lock().expect("lock poisoned");
        let hits = counters.memory.hits + counters.file.hits;

        #[expect(clippy::cast_precision_loss, reason = "counters stay far below 2^52")]
        let hit_rate = if counters.lookups == 0 { 0.0 } else { hits as f64 / counters.lookups as f64 };

        #[expect(clippy::cast_precision_loss, reason = "counters stay far below 2^52")]
        let average_latency_ms = if counters.operations == 0 {
            0.0
        } else {
            counters.total_latency.as_secs_f64() * 1000.0 / counters.operations as f64
        };

        CacheManagerStats {
            enabled: self.tiers.is_some(),
            lookups: counters.lookups,
            memory: counters.memory,
            file: counters.file,
            hit_rate,
            average_latency_ms,
            memory_cache: self.tiers.as_ref().map(|tiers| tiers.memory.stats()),
        }
    }

    /// Scans the disk tier.
    pub fn file_stats(&self) -> Result<Option<FileCacheStats>, CacheError> {
        self.tiers.as_ref().map(|tiers| tiers.file.stats()).transpose()
    }

    /// Starts the periodic cleanup task if it is not already running. Needs a tokio runtime.
    pub fn start_cleanup(&self) {
        let Some(tiers) = self.tiers.as_ref() else {
            return;
        };

        let mut task = self.cleanup_task.lock().expect("lock poisoned");
        if task.is_none() {
            *task = Some(CleanupTask::start(Arc::clone(&tiers.memory), Arc::clone(&tiers.file), self.cleanup_interval));
        }
    }

    /// Stops the periodic cleanup task and waits for it to exit.
    pub async fn stop_cleanup(&self) {
        let task = self.cleanup_task.lock().expect("lock poisoned").take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    #[must_use]
    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup_task.lock().expect("lock poisoned").as_ref().is_some_and(CleanupTask::is_running)
    }

    pub fn cache_pull_request(&self, pr: &PullRequest) -> Result<(), CacheError> {
        self.set(&keys::pull_request_key(pr.id), pr, SetOptions::default())
    }

    pub fn get_cached_pull_request(&self, id: u64) -> Option<PullRequest> {
        self.get(&keys::pull_request_key(id))
    }

    pub fn cache_processed_pr_data(&self, collection_key: &str, records: &[ProcessedPullRequest]) -> Result<(), CacheError> {
        self.set(collection_key, &records.to_vec(), SetOptions::default())
    }

    pub fn get_cached_processed_pr_data(&self, collection_key: &str) -> Option<(Vec<ProcessedPullRequest>, DataSource)> {
        self.get_with_source(collection_key)
    }

    /// Folds freshly processed records into the cache.
    ///
    /// In incremental mode they are merged into the cached collection by pull request id:
    /// existing records are replaced in place with a refreshed processing time and new ones are
    /// appended. The merged collection is written back and returned. Otherwise each record is
    /// cached on its own and the input is returned unchanged.
    pub fn update_pull_requests_incremental(
        &self,
        collection_key: &str,
        records: Vec<ProcessedPullRequest>,
    ) -> Result<Vec<ProcessedPullRequest>, CacheError> {
        if !self.incremental {
            for record in &records {
                self.set(&keys::processed_pull_request_key(record.id()), record, SetOptions::default())?;
            }
            return Ok(records);
        }

        let mut merged: Vec<ProcessedPullRequest> = self.get(collection_key).unwrap_or_default();
        let mut positions: HashMap<u64, usize> = merged.iter().enumerate().map(|(index, record)| (record.id(), index)).collect();
        let now = self.clock.now();
        let (mut replaced, mut added) = (0_usize, 0_usize);

        for mut record in records {
            record.processing.processed_at = now;
            if let Some(&index) = positions.get(&record.id()) {
                merged[index] = record;
                replaced += 1;
            } else {
                let _ = positions.insert(record.id(), merged.len());
                merged.push(record);
                added += 1;
            }
        }

        log::debug!(
            target: LOG_TARGET,
            "Incremental update of '{collection_key}': {replaced} replaced, {added} added, {} total",
            merged.len()
        );

        self.set(collection_key, &merged, SetOptions::default())?;
        Ok(merged)
    }
}
