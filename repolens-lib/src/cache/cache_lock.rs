use crate::errors::CacheError;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Log target for the cache lock
const LOG_TARGET: &str = "      lock";

const LOCK_FILE_NAME: &str = "cache.lock";

/// Holds the cache directory lock; released on drop.
#[derive(Debug)]
pub struct CacheLockGuard(File);

impl Drop for CacheLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.unlock() {
            log::warn!(target: LOG_TARGET, "Could not unlock cache: {e:#}");
        }
    }
}

/// Takes an exclusive advisory lock on the cache directory so only one process writes to it.
///
/// Waits for other holders to release the lock. The directory is created if missing.
pub async fn acquire_cache_lock(cache_dir: &Path) -> Result<CacheLockGuard, CacheError> {
    std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
    let lock_path = cache_dir.join(LOCK_FILE_NAME);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| CacheError::Lock {
            path: lock_path.clone(),
            source,
        })?;

    // lock_exclusive blocks the calling thread
    let file = tokio::task::spawn_blocking(move || {
        file.lock_exclusive().map_err(|source| CacheError::Lock {
            path: lock_path.clone(),
            source,
        })?;
        log::debug!(target: LOG_TARGET, "Acquired cache lock at '{}'", lock_path.display());
        Ok::<_, CacheError>(file)
    })
    .await
    .map_err(|e| CacheError::Lock {
        path: cache_dir.join(LOCK_FILE_NAME),
        source: std::io::Error::other(e),
    })??;

    Ok(CacheLockGuard(file))
}
