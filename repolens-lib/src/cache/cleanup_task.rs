use super::file::FileCache;
use super::memory::MemoryCache;
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Log target for the cleanup task
const LOG_TARGET: &str = "   cleanup";

/// A periodic sweep of both cache tiers running on the tokio runtime.
///
/// The first sweep happens one full interval after [`CleanupTask::start`]. Dropping the task
/// aborts it; [`CleanupTask::stop`] lets an in-flight sweep finish first.
#[derive(Debug)]
pub struct CleanupTask {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Spawns the task. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(memory: Arc<MemoryCache>, file: Arc<FileCache>, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // the first tick completes immediately
            let _ = ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => sweep(&memory, &file).await,
                }
            }

            log::debug!(target: LOG_TARGET, "Cache cleanup task stopped");
        });

        log::debug!(target: LOG_TARGET, "Cache cleanup task started with a {}s period", interval.as_secs());

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            log::warn!(target: LOG_TARGET, "Cache cleanup task failed: {e}");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn sweep(memory: &MemoryCache, file: &Arc<FileCache>) {
    let expired = memory.cleanup();

    let file = Arc::clone(file);
    match tokio::task::spawn_blocking(move || file.cleanup()).await {
        Ok(Ok(report)) => log::debug!(
            target: LOG_TARGET,
            "Periodic cleanup removed {expired} memory entries and {} files",
            report.expired_removed + report.corrupt_removed + report.evicted
        ),
        Ok(Err(e)) => log::warn!(target: LOG_TARGET, "Periodic file cache cleanup failed: {e}"),
        Err(e) => log::warn!(target: LOG_TARGET, "Periodic file cache cleanup panicked: {e}"),
    }
}
