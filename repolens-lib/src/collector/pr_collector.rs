use super::progress::Progress;
use crate::api::{ApiClient, PullRequestFilters, PullRequestListing};
use crate::cache::{CacheLockGuard, CacheManager, CacheManagerStats, Clock, SystemClock, acquire_cache_lock, keys};
use crate::config::{self, PartialConfig, Settings};
use crate::errors::{IntegrationError, ItemError};
use crate::linking::RecordLinker;
use crate::model::{
    CacheProvenance, CommitRecord, DataSource, ItemFailure, ProcessedPullRequest, ProcessingMetadata, PullRequest, PullRequestMetrics,
};
use chrono::{DateTime, TimeDelta, Utc};
use core::fmt::{Debug, Display, Formatter};
use core::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::sync::Arc;

/// Log target for the collector
const LOG_TARGET: &str = " collector";

/// Progress is logged after every this many records.
const PROGRESS_EVERY: usize = 10;

/// Lifecycle of a [`Collector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Uninitialized,
    Initializing,
    Ready,
    Fetching,
    Failed,
}

impl Display for CollectorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Fetching => "fetching",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Parameters of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectRequest {
    pub filters: PullRequestFilters,

    /// Ignore the cached collection and fetch from the service. Results are still cached.
    pub refresh: bool,
}

/// Result of [`Collector::collect_pull_request_data`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOutcome {
    pub records: Vec<ProcessedPullRequest>,
    pub failures: Vec<ItemFailure>,

    /// Set when the whole collection was served from cache.
    pub from_cache: Option<DataSource>,
    pub stats: CacheManagerStats,
}

struct Services {
    settings: Settings,
    cache: CacheManager,
    client: ApiClient,
    linker: RecordLinker,
    _cache_lock: Option<CacheLockGuard>,
}

/// Fetches pull requests, links them to commits, and keeps the results cached.
pub struct Collector {
    layers: Vec<PartialConfig>,
    commits: Vec<CommitRecord>,
    progress: Arc<dyn Progress>,
    clock: Arc<dyn Clock>,
    state: CollectorState,
    services: Option<Services>,
}

impl Debug for Collector {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collector")
            .field("state", &self.state)
            .field("commits", &self.commits.len())
            .field("progress", &"<dyn Progress>")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Creates an uninitialized collector.
    ///
    /// `layers` are merged in order when [`Collector::initialize`] runs; `commits` are the
    /// candidates for linkage.
    #[must_use]
    pub fn new(layers: Vec<PartialConfig>, commits: Vec<CommitRecord>, progress: Arc<dyn Progress>) -> Self {
        Self {
            layers,
            commits,
            progress,
            clock: Arc::new(SystemClock),
            state: CollectorState::Uninitialized,
            services: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn state(&self) -> CollectorState {
        self.state
    }

    /// The resolved settings, once initialized.
    #[must_use]
    pub fn settings(&self) -> Option<&Settings> {
        self.services.as_ref().map(|s| &s.settings)
    }

    /// The cache manager, once initialized.
    #[must_use]
    pub fn cache(&self) -> Option<&CacheManager> {
        self.services.as_ref().map(|s| &s.cache)
    }

    /// Resolves configuration, opens the cache, and verifies the service is reachable.
    ///
    /// Any failure leaves the collector [`CollectorState::Failed`].
    pub async fn initialize(&mut self) -> Result<(), IntegrationError> {
        self.expect_state(CollectorState::Uninitialized, "uninitialized")?;
        self.state = CollectorState::Initializing;

        match self.build_services().await {
            Ok(services) => {
                services.cache.start_cleanup();
                log::info!(
                    target: LOG_TARGET,
                    "Ready for {}/{}{} with {} commits",
                    services.settings.organization,
                    services.settings.project,
                    services.settings.repository.as_deref().map(|r| format!("/{r}")).unwrap_or_default(),
                    services.linker.commit_count()
                );
                self.services = Some(services);
                self.state = CollectorState::Ready;
                Ok(())
            }
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Initialization failed: {e}");
                self.state = CollectorState::Failed;
                Err(e)
            }
        }
    }

    async fn build_services(&self) -> Result<Services, IntegrationError> {
        self.progress.set_phase("Configuring");
        let settings = config::resolve(self.layers.iter().cloned())?;

        let cache_lock = if settings.cache.enabled {
            Some(acquire_cache_lock(&settings.cache.directory).await?)
        } else {
            None
        };
        let cache = CacheManager::new(&settings.cache, Arc::clone(&self.clock))?;

        self.progress.set_phase("Connecting");
        let client = ApiClient::new(&settings, Arc::clone(&self.progress))?;
        client
            .check_connection()
            .await
            .map_err(|source| IntegrationError::Connectivity {
                organization: settings.organization.clone(),
                project: settings.project.clone(),
                source,
            })?;

        let linker = RecordLinker::new(self.commits.clone());

        Ok(Services {
            settings,
            cache,
            client,
            linker,
            _cache_lock: cache_lock,
        })
    }

    /// Runs one collection: serve a fresh cached collection, or fetch, process, and cache.
    ///
    /// Individual pull requests that fail processing are reported in
    /// [`CollectionOutcome::failures`] without failing the run. A failed run leaves the collector
    /// ready for another attempt.
    pub async fn collect_pull_request_data(&mut self, request: &CollectRequest) -> Result<CollectionOutcome, IntegrationError> {
        self.expect_state(CollectorState::Ready, "ready")?;
        let Some(services) = self.services.as_ref() else {
            return Err(self.invalid_state("ready"));
        };

        self.state = CollectorState::Fetching;
        let result = collect(services, request, self.progress.as_ref(), self.clock.now()).await;
        self.state = CollectorState::Ready;
        result
    }

    /// Stops background work and releases the cache lock. The collector can be initialized again.
    pub async fn shutdown(&mut self) {
        if let Some(services) = self.services.take() {
            services.cache.stop_cleanup().await;
            log::debug!(target: LOG_TARGET, "Shut down");
        }
        self.state = CollectorState::Uninitialized;
    }

    fn expect_state(&self, expected: CollectorState, name: &'static str) -> Result<(), IntegrationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(name))
        }
    }

    fn invalid_state(&self, expected: &'static str) -> IntegrationError {
        IntegrationError::InvalidState {
            actual: self.state.to_string(),
            expected,
        }
    }
}

async fn collect(
    services: &Services,
    request: &CollectRequest,
    progress: &dyn Progress,
    now: DateTime<Utc>,
) -> Result<CollectionOutcome, IntegrationError> {
    let Services {
        settings, cache, client, linker, ..
    } = services;
    let filter_digest = request.filters.digest();
    let collection_key = keys::processed_collection_key(
        &settings.organization,
        &settings.project,
        settings.repository.as_deref(),
        filter_digest.as_deref(),
    );

    if request.refresh {
        log::debug!(target: LOG_TARGET, "Skipping cached collection for this run");
    } else if let Some((records, source)) = fresh_cached_collection(cache, &collection_key, now) {
        log::info!(target: LOG_TARGET, "Using {} cached pull requests from the {source:?} tier", records.len());
        return Ok(CollectionOutcome {
            records,
            failures: Vec::new(),
            from_cache: Some(source),
            stats: cache.stats(),
        });
    }

    let PullRequestListing { records: fetched, malformed } = client.fetch_pull_requests(&request.filters).await?;

    progress.set_phase("Linking");
    let total = fetched.len();
    let processed_count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&processed_count);
    progress.set_determinate(Box::new(move || {
        let current = counter.load(Ordering::Relaxed);
        (total as u64, current, format!("{current} of {total} pull requests"))
    }));

    let mut records = Vec::with_capacity(total);
    let mut failures = malformed;
    for (index, pull_request) in fetched.into_iter().enumerate() {
        match process(pull_request, cache, linker, now) {
            Ok(record) => records.push(record),
            Err((pull_request, e)) => {
                log::warn!(target: LOG_TARGET, "Skipping pull request {}: {e}", pull_request.id);
                failures.push(ItemFailure {
                    pull_request_id: Some(pull_request.id),
                    title: pull_request.title,
                    reason: e.to_string(),
                });
            }
        }

        let _ = processed_count.fetch_add(1, Ordering::Relaxed);
        if (index + 1) % PROGRESS_EVERY == 0 || index + 1 == total {
            log::info!(target: LOG_TARGET, "Processed {} of {total} pull requests", index + 1);
        }
    }

    if !failures.is_empty() {
        log::warn!(target: LOG_TARGET, "{} pull requests could not be processed", failures.len());
    }

    progress.set_phase("Caching");
    let records = if cache.is_enabled() {
        let merged = cache.update_pull_requests_incremental(&collection_key, records)?;
        if !cache.is_incremental() {
            cache.cache_processed_pr_data(&collection_key, &merged)?;
        }
        merged
    } else {
        records
    };

    Ok(CollectionOutcome {
        records,
        failures,
        from_cache: None,
        stats: cache.stats(),
    })
}

/// The cached collection, if every record in it was processed within the cache TTL.
fn fresh_cached_collection(cache: &CacheManager, key: &str, now: DateTime<Utc>) -> Option<(Vec<ProcessedPullRequest>, DataSource)> {
    let (records, source) = cache.get_cached_processed_pr_data(key)?;
    let ttl = TimeDelta::from_std(cache.ttl()).unwrap_or(TimeDelta::MAX);
    let cutoff = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);

    if records.is_empty() {
        return None;
    }
    if let Some(stale) = records.iter().find(|r| r.processing.processed_at <= cutoff) {
        log::debug!(
            target: LOG_TARGET,
            "Cached collection is stale (pull request {} processed at {})",
            stale.id(),
            stale.processing.processed_at
        );
        return None;
    }
    Some((records, source))
}

fn process(
    pull_request: PullRequest,
    cache: &CacheManager,
    linker: &RecordLinker,
    now: DateTime<Utc>,
) -> Result<ProcessedPullRequest, (PullRequest, ItemError)> {
    let metrics = match PullRequestMetrics::compute(&pull_request) {
        Ok(metrics) => metrics,
        Err(e) => return Err((pull_request, e)),
    };
    let associations = linker.find_associated_commits(&pull_request);

    if let Err(source) = cache.cache_pull_request(&pull_request) {
        let id = pull_request.id;
        return Err((pull_request, ItemError::Cache { id, source }));
    }

    Ok(ProcessedPullRequest {
        pull_request,
        metrics,
        associations,
        processing: ProcessingMetadata {
            processed_at: now,
            cache: CacheProvenance::fetched(),
        },
    })
}
