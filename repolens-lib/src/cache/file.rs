use super::clock::Clock;
use super::entry::{CacheEntry, EntryHeader, SCHEMA_VERSION};
use crate::errors::CacheError;
use chrono::{DateTime, Utc};
use core::time::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Log target for the file cache
const LOG_TARGET: &str = "      file";

/// Number of shard directories, one per leading hash byte.
const SHARD_COUNT: usize = 256;

/// After size-based eviction the cache is at most this fraction of its maximum.
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Outcome of [`FileCache::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCleanupReport {
    pub expired_removed: usize,
    pub corrupt_removed: usize,
    pub evicted: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Result of a full scan of the cache directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCacheStats {
    pub directory: PathBuf,
    pub file_count: usize,
    pub expired_count: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub utilization_percent: f64,
}

struct ScannedFile {
    path: PathBuf,
    size: u64,
    last_accessed_at: DateTime<Utc>,
}

/// A persistent cache that stores one JSON file per key.
///
/// Files live at `{dir}/{first two hex chars of sha256(key)}/{sha256(key)}.json`. Writes to a
/// shard are serialized by a per-shard mutex and land via a temporary file that is renamed into
/// place, so readers never observe a half-written entry.
pub struct FileCache {
    dir: PathBuf,
    max_size_bytes: u64,
    default_ttl: Duration,
    cleanup_probability: f64,
    clock: Arc<dyn Clock>,
    shard_locks: Vec<Mutex<()>>,
}

impl core::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileCache")
            .field("dir", &self.dir)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("default_ttl", &self.default_ttl)
            .field("cleanup_probability", &self.cleanup_probability)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// Opens a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, max_size_bytes: u64, default_ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        Ok(Self {
            dir,
            max_size_bytes,
            default_ttl,
            cleanup_probability: 0.01,
            clock,
            shard_locks: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Sets the chance that a write also triggers [`Self::cleanup`]. Clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_cleanup_probability(mut self, probability: f64) -> Self {
        self.cleanup_probability = probability.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let (_, hash) = hash_key(key);
        self.dir.join(&hash[..2]).join(format!("{hash}.json"))
    }

    fn shard_lock(&self, key: &str) -> &Mutex<()> {
        let (shard, _) = hash_key(key);
        &self.shard_locks[usize::from(shard)]
    }

    /// Reads a live entry.
    ///
    /// Expired, corrupt, and outdated entries are deleted and reported as `Ok(None)`. A hit
    /// rewrites the entry with refreshed access metadata.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        let mut entry: CacheEntry<serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Removing unreadable cache file '{}': {e}", path.display());
                self.remove_file(key, &path);
                return Ok(None);
            }
        };

        if entry.schema_version != SCHEMA_VERSION {
            log::debug!(
                target: LOG_TARGET,
                "Removing cache file '{}' with schema version {} (current is {SCHEMA_VERSION})",
                path.display(),
                entry.schema_version
            );
            self.remove_file(key, &path);
            return Ok(None);
        }

        if entry.key != key {
            log::debug!(target: LOG_TARGET, "Cache file '{}' belongs to another key", path.display());
            return Ok(None);
        }

        let now = self.clock.now();
        if entry.is_expired(now) {
            log::trace!(target: LOG_TARGET, "Removing expired cache entry '{key}'");
            self.remove_file(key, &path);
            return Ok(None);
        }

        entry.touch(now);
        if let Err(e) = self.write_entry(key, &path, &entry) {
            log::debug!(target: LOG_TARGET, "Could not refresh access time of '{key}': {e}");
        }

        serde_json::from_value(entry.data)
            .map(Some)
            .map_err(|source| CacheError::Decode { key: key.to_string(), source })
    }

    /// Writes an entry, using the default TTL when `ttl` is `None`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError> {
        let data = serde_json::to_value(value).map_err(|source| CacheError::Serialize { key: key.to_string(), source })?;
        let data_size = data.to_string().len() as u64;
        let entry = CacheEntry::new(key, data, data_size, self.clock.now(), ttl.unwrap_or(self.default_ttl));

        self.write_entry(key, &self.path_for(key), &entry)?;

        if self.cleanup_probability > 0.0 && rand::random::<f64>() < self.cleanup_probability {
            log::debug!(target: LOG_TARGET, "Running opportunistic cache cleanup");
            if let Err(e) = self.cleanup() {
                log::warn!(target: LOG_TARGET, "Opportunistic cache cleanup failed: {e}");
            }
        }

        Ok(())
    }

    /// Whether a live entry exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        let path = self.path_for(key);
        fs::read(&path).ok().and_then(|bytes| serde_json::from_slice::<EntryHeader>(&bytes).ok()).is_some_and(|header| {
            header.schema_version == SCHEMA_VERSION && header.key == key && !header.is_expired(self.clock.now())
        })
    }

    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        let _guard = self.shard_lock(key).lock().expect("lock poisoned");
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Removes every cached entry. Files outside the shard directories are left alone.
    pub fn clear(&self) -> Result<(), CacheError> {
        for shard in self.shard_dirs()? {
            fs::remove_dir_all(&shard).map_err(|e| CacheError::io(&shard, e))?;
        }
        log::info!(target: LOG_TARGET, "Cleared file cache at '{}'", self.dir.display());
        Ok(())
    }

    /// Deletes expired and unreadable entries, then evicts the least recently accessed entries
    /// until the cache occupies at most 80% of its maximum size.
    pub fn cleanup(&self) -> Result<FileCleanupReport, CacheError> {
        let now = self.clock.now();
        let mut report = FileCleanupReport::default();
        let mut live = Vec::new();

        for (path, size) in self.entry_files()? {
            report.bytes_before += size;
            match read_header(&path) {
                Some(header) if header.schema_version == SCHEMA_VERSION && !header.is_expired(now) => live.push(ScannedFile {
                    path,
                    size,
                    last_accessed_at: header.last_accessed_at,
                }),
                Some(header) if header.schema_version == SCHEMA_VERSION => {
                    self.remove_file(&header.key, &path);
                    report.expired_removed += 1;
                }
                _ => {
                    remove_quietly(&path);
                    report.corrupt_removed += 1;
                }
            }
        }

        let mut total: u64 = live.iter().map(|file| file.size).sum();
        if total > self.max_size_bytes {
            #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "sizes are far below 2^52")]
            let target = (self.max_size_bytes as f64 * EVICTION_TARGET_RATIO) as u64;

            live.sort_by_key(|file| file.last_accessed_at);
            for file in &live {
                if total <= target {
                    break;
                }
                remove_quietly(&file.path);
                total = total.saturating_sub(file.size);
                report.evicted += 1;
            }
        }

        report.bytes_after = total;
        if report.expired_removed + report.corrupt_removed + report.evicted > 0 {
            log::info!(
                target: LOG_TARGET,
                "Cache cleanup removed {} expired, {} unreadable, and {} evicted entries ({} -> {} bytes)",
                report.expired_removed,
                report.corrupt_removed,
                report.evicted,
                report.bytes_before,
                report.bytes_after
            );
        }

        Ok(report)
    }

    /// Scans the cache directory.
    pub fn stats(&self) -> Result<FileCacheStats, CacheError> {
        let now = self.clock.now();
        let mut stats = FileCacheStats {
            directory: self.dir.clone(),
            file_count: 0,
            expired_count: 0,
            total_bytes: 0,
            max_bytes: self.max_size_bytes,
            utilization_percent: 0.0,
        };

        for (path, size) in self.entry_files()? {
            stats.file_count += 1;
            stats.total_bytes += size;
            if read_header(&path).is_none_or(|header| header.is_expired(now)) {
                stats.expired_count += 1;
            }
        }

        if self.max_size_bytes > 0 {
            #[expect(clippy::cast_precision_loss, reason = "sizes are far below 2^52")]
            let utilization = stats.total_bytes as f64 / self.max_size_bytes as f64 * 100.0;
            stats.utilization_percent = utilization;
        }

        Ok(stats)
    }

    fn write_entry<T: Serialize>(&self, key: &str, path: &Path, entry: &CacheEntry<T>) -> Result<(), CacheError> {
        let _guard = self.shard_lock(key).lock().expect("lock poisoned");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }

        let temp_path = path.with_extension("json.tmp");
        let file = fs::File::create(&temp_path).map_err(|e| CacheError::io(&temp_path, e))?;
        let mut writer = BufWriter::new(file);

        #[cfg(debug_assertions)]
        let serialized = serde_json::to_writer_pretty(&mut writer, entry);
        #[cfg(not(debug_assertions))]
        let serialized = serde_json::to_writer(&mut writer, entry);

        serialized.map_err(|source| CacheError::Serialize { key: key.to_string(), source })?;
        writer.flush().map_err(|e| CacheError::io(&temp_path, e))?;
        drop(writer);

        fs::rename(&temp_path, path).map_err(|e| CacheError::io(path, e))
    }

    fn remove_file(&self, key: &str, path: &Path) {
        let _guard = self.shard_lock(key).lock().expect("lock poisoned");
        remove_quietly(path);
    }

    fn shard_dirs(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        Ok(entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| entry.file_name().to_str().is_some_and(is_shard_name))
            .map(|entry| entry.path())
            .collect())
    }

    fn entry_files(&self) -> Result<Vec<(PathBuf, u64)>, CacheError> {
        let mut files = Vec::new();
        for shard in self.shard_dirs()? {
            for entry in WalkDir::new(&shard).min_depth(1).max_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::debug!(target: LOG_TARGET, "Skipping unreadable cache path: {e}");
                        continue;
                    }
                };

                if entry.path().extension().is_none_or(|ext| ext != "json") {
                    continue;
                }

                let size = entry.metadata().map_or(0, |m| m.len());
                files.push((entry.into_path(), size));
            }
        }
        Ok(files)
    }
}

fn hash_key(key: &str) -> (u8, String) {
    let digest = Sha256::digest(key.as_bytes());
    (digest[0], format!("{digest:x}"))
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn read_header(path: &Path) -> Option<EntryHeader> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        log::debug!(target: LOG_TARGET, "Could not remove cache file '{}': {e}", path.display());
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use chrono::TimeDelta;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Nested {
        name: String,
        tags: Vec<String>,
        scores: BTreeMap<String, f64>,
        child: Option<Box<Self>>,
    }

    fn nested() -> Nested {
        Nested {
            name: "root".into(),
            tags: vec!["a".into(), "b".into()],
            scores: BTreeMap::from([("x".into(), 0.5), ("y".into(), 1.25)]),
            child: Some(Box::new(Nested {
                name: "leaf".into(),
                tags: Vec::new(),
                scores: BTreeMap::new(),
                child: None,
            })),
        }
    }

    fn cache(dir: &Path, max_size_bytes: u64) -> (FileCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = FileCache::new(dir, max_size_bytes, Duration::from_secs(3600), Arc::clone(&clock) as Arc<dyn Clock>)
            .unwrap()
            .with_cleanup_probability(0.0);
        (cache, clock)
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_round_trip_nested_payload() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        cache.set("azure-devops:pr:1", &nested(), None).unwrap();
        let value: Nested = cache.get("azure-devops:pr:1").unwrap().unwrap();
        assert_eq!(value, nested());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_path_layout() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        let path = cache.path_for("azure-devops:pr:1");
        let file_name = path.file_stem().unwrap().to_str().unwrap().to_string();
        let shard = path.parent().unwrap().file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(file_name.len(), 64);
        assert_eq!(shard, file_name[..2]);
        assert_eq!(path.parent().unwrap().parent().unwrap(), temp.path());

        cache.set("azure-devops:pr:1", &1, None).unwrap();
        assert!(path.exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_expired_entry_is_removed() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(temp.path(), 1 << 20);

        cache.set("k", &"v", Some(Duration::from_secs(60))).unwrap();
        let path = cache.path_for("k");
        assert!(path.exists());

        clock.advance(TimeDelta::seconds(61));
        assert_eq!(cache.get::<String>("k").unwrap(), None);
        assert!(!path.exists());
        assert!(!cache.has("k"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_corrupt_entry_is_removed() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        cache.set("k", &1, None).unwrap();
        let path = cache.path_for("k");
        fs::write(&path, b"{ not json").unwrap();

        assert_eq!(cache.get::<i32>("k").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_other_schema_version_is_removed() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        cache.set("k", &1, None).unwrap();
        let path = cache.path_for("k");
        let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["schemaVersion"] = serde_json::json!(SCHEMA_VERSION + 1);
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        assert_eq!(cache.get::<i32>("k").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_hit_refreshes_access_metadata() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(temp.path(), 1 << 20);

        cache.set("k", &1, None).unwrap();
        clock.advance(TimeDelta::seconds(30));
        let _: Option<i32> = cache.get("k").unwrap();

        let entry: CacheEntry<i32> = serde_json::from_slice(&fs::read(cache.path_for("k")).unwrap()).unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed_at, clock.now());
        assert!(entry.last_accessed_at > entry.created_at);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_type_mismatch_is_a_decode_error() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        cache.set("k", &"text", None).unwrap();
        let result = cache.get::<u64>("k");
        assert!(matches!(result, Err(CacheError::Decode { .. })));
        assert!(cache.has("k"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_delete() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        cache.set("k", &1, None).unwrap();
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert_eq!(cache.get::<i32>("k").unwrap(), None);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_cleanup_removes_expired_first() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(temp.path(), 1 << 20);

        cache.set("short", &1, Some(Duration::from_secs(10))).unwrap();
        cache.set("long", &2, Some(Duration::from_secs(1000))).unwrap();
        clock.advance(TimeDelta::seconds(11));

        let report = cache.cleanup().unwrap();
        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.evicted, 0);
        assert!(cache.has("long"));
        assert!(!cache.path_for("short").exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_cleanup_enforces_size_bound_lru_first() {
        let temp = tempfile::tempdir().unwrap();
        let payload = "x".repeat(1000);

        // Measure one entry so the bound fits four of them.
        let (probe, _) = cache(temp.path(), u64::MAX);
        probe.set("probe", &payload, None).unwrap();
        let entry_size = fs::metadata(probe.path_for("probe")).unwrap().len();
        probe.clear().unwrap();

        let max = entry_size * 4 + entry_size / 2;
        let (cache, clock) = cache(temp.path(), max);
        for i in 0..8 {
            cache.set(&format!("key-{i}"), &payload, None).unwrap();
            clock.advance(TimeDelta::seconds(1));
        }

        // Touch the two oldest so they become the most recent.
        let _: Option<String> = cache.get("key-0").unwrap();
        clock.advance(TimeDelta::seconds(1));
        let _: Option<String> = cache.get("key-1").unwrap();

        let report = cache.cleanup().unwrap();
        assert!(report.evicted > 0);
        assert!(report.bytes_after <= max);

        let stats = cache.stats().unwrap();
        assert!(stats.total_bytes <= max);
        assert!(cache.has("key-0"));
        assert!(cache.has("key-1"));
        assert!(!cache.has("key-2"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_cleanup_removes_unreadable_files() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(temp.path(), 1 << 20);

        cache.set("k", &1, None).unwrap();
        fs::write(cache.path_for("k"), b"garbage").unwrap();

        let report = cache.cleanup().unwrap();
        assert_eq!(report.corrupt_removed, 1);
        assert_eq!(cache.stats().unwrap().file_count, 0);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_stats_and_clear_leave_foreign_files() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(temp.path(), 1 << 20);
        fs::write(temp.path().join("cache.lock"), b"").unwrap();

        cache.set("a", &1, None).unwrap();
        cache.set("b", &2, Some(Duration::from_secs(1))).unwrap();
        clock.advance(TimeDelta::seconds(2));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.expired_count, 1);
        assert!(stats.total_bytes > 0);
        assert!(stats.utilization_percent > 0.0);

        cache.clear().unwrap();
        assert_eq!(cache.stats().unwrap().file_count, 0);
        assert!(temp.path().join("cache.lock").exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_probabilistic_cleanup_runs_when_certain() {
        let temp = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(temp.path(), 1 << 20);
        let cache = cache.with_cleanup_probability(1.0);

        cache.set("stale", &1, Some(Duration::from_secs(1))).unwrap();
        clock.advance(TimeDelta::seconds(2));
        cache.set("fresh", &2, None).unwrap();

        assert!(!cache.path_for("stale").exists());
        assert!(cache.has("fresh"));
    }
}
