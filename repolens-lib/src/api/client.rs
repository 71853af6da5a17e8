use super::filters::PullRequestFilters;
use super::pagination::{FetchStrategy, PaginationStrategy, TimeRange};
use super::rate_limiter::RateLimiter;
use super::retry::{RetryPolicy, classify, get_with_retry};
use crate::collector::Progress;
use crate::config::Settings;
use crate::errors::{ClientError, ClientErrorKind};
use crate::model::{ItemFailure, PullRequest, PullRequestPage};
use chrono::{DateTime, Utc};
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Log target for the API client
const LOG_TARGET: &str = "    client";

const USER_AGENT: &str = concat!("repolens/", env!("CARGO_PKG_VERSION"));

/// Endpoint label used for page size decisions.
const LIST_ENDPOINT: &str = "pullrequests";

const TOTAL_COUNT_HEADER: &str = "x-total-count";
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// What a one-item probe request revealed about a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Expected number of matching pull requests, when the service reported one.
    pub estimated_total: Option<u64>,

    /// Round-trip time of the probe.
    pub latency: Duration,
}

/// Pull requests returned by a listing, plus the records that could not be decoded.
#[derive(Debug, Clone, Default)]
pub struct PullRequestListing {
    pub records: Vec<PullRequest>,
    pub malformed: Vec<ItemFailure>,
}

impl PullRequestListing {
    fn append(&mut self, other: Self) {
        self.records.extend(other.records);
        for failure in other.malformed {
            let seen = failure.pull_request_id.is_some()
                && self.malformed.iter().any(|f| f.pull_request_id == failure.pull_request_id);
            if !seen {
                self.malformed.push(failure);
            }
        }
    }
}

/// Creation dates one slice of a partitioned fetch keeps.
#[derive(Debug, Clone, Copy)]
struct Window {
    range: TimeRange,

    /// Keep records created exactly at `range.end`, for the slice that closes a bounded range.
    end_inclusive: bool,
}

impl Window {
    fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.range.contains(instant) || (self.end_inclusive && instant == self.range.end)
    }
}

/// Client for the Azure DevOps pull request REST API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    organization: String,
    project: String,
    repository: Option<String>,
    api_version: String,
    token: Option<Arc<str>>,
    limiter: Arc<RateLimiter>,
    pagination: PaginationStrategy,
    max_pages: u32,
    retry: RetryPolicy,
    partition_delay: Duration,
    default_lookback: Duration,
    progress: Arc<dyn Progress>,
}

impl ApiClient {
    pub fn new(settings: &Settings, progress: Arc<dyn Progress>) -> Result<Self, ClientError> {
        let api = &settings.api;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::new("create HTTP client", api.base_url.as_str(), ClientErrorKind::InvalidRequest).with_source(e))?;

        Ok(Self {
            http,
            base_url: api.base_url.clone(),
            organization: settings.organization.clone(),
            project: settings.project.clone(),
            repository: settings.repository.clone(),
            api_version: api.version.clone(),
            token: settings.personal_access_token.as_deref().map(Arc::from),
            limiter: Arc::new(RateLimiter::new(api.rate_limit.requests_per_minute, api.rate_limit.enabled)),
            pagination: PaginationStrategy::new(api.pagination.page_size, api.pagination.max_page_size),
            max_pages: api.pagination.max_pages,
            retry: RetryPolicy::new(api.max_retries, api.retry_base_delay, api.timeout),
            partition_delay: api.partition_delay,
            default_lookback: api.default_lookback,
            progress,
        })
    }

    /// Verifies that the project is reachable with the configured credentials.
    pub async fn check_connection(&self) -> Result<(), ClientError> {
        let url = self.url(&[self.organization.as_str(), "_apis", "projects", self.project.as_str()]);
        let _ = self.get(url, "check connection").await?;
        log::debug!(target: LOG_TARGET, "Connected to {}/{}", self.organization, self.project);
        Ok(())
    }

    /// Fetches every pull request matching `filters`.
    ///
    /// A probe request estimates the result size, which picks the page size and whether the
    /// creation-date range is fetched in partitions. Records that do not decode are returned in
    /// [`PullRequestListing::malformed`] rather than failing the fetch.
    pub async fn fetch_pull_requests(&self, filters: &PullRequestFilters) -> Result<PullRequestListing, ClientError> {
        self.progress.set_phase("Probing");
        let probe = self.probe(filters).await?;
        let page_size = self
            .pagination
            .calculate_optimal_page_size(LIST_ENDPOINT, probe.estimated_total, probe.latency);

        let fetched = Arc::new(AtomicU64::new(0));
        self.progress.set_phase("Fetching");
        let counter = Arc::clone(&fetched);
        if let Some(total) = probe.estimated_total {
            self.progress.set_determinate(Box::new(move || {
                let current = counter.load(Ordering::Relaxed);
                (total, current.min(total), format!("{current} of ~{total} pull requests"))
            }));
        } else {
            self.progress
                .set_indeterminate(Box::new(move || format!("{} pull requests", counter.load(Ordering::Relaxed))));
        }

        let listing = match PaginationStrategy::select_strategy(probe.estimated_total) {
            FetchStrategy::Standard => self.fetch_pages(filters, page_size, None, &fetched).await?,
            FetchStrategy::TimePartitioned => self.fetch_partitioned(filters, page_size, &fetched).await?,
        };

        log::info!(
            target: LOG_TARGET,
            "Fetched {} pull requests from {}/{}",
            listing.records.len(),
            self.organization,
            self.project
        );
        if !listing.malformed.is_empty() {
            log::warn!(target: LOG_TARGET, "Skipped {} malformed pull request records", listing.malformed.len());
        }
        Ok(listing)
    }

    /// Issues a one-item request to estimate the result size and measure latency.
    pub async fn probe(&self, filters: &PullRequestFilters) -> Result<ProbeResult, ClientError> {
        let url = self.list_url(filters, 1, None);
        let started = Instant::now();
        let response = self.get(url, "probe pull requests").await?;
        let header_total = header_value(response.headers(), TOTAL_COUNT_HEADER).and_then(|v| v.parse::<u64>().ok());
        let page: PullRequestPage = decode(response, "probe pull requests").await?;
        let latency = started.elapsed();

        let estimated_total = header_total.or(page.count);
        log::debug!(
            target: LOG_TARGET,
            "Probe took {}ms, estimated total {}",
            latency.as_millis(),
            estimated_total.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        );
        Ok(ProbeResult { estimated_total, latency })
    }

    async fn fetch_partitioned(&self, filters: &PullRequestFilters, page_size: u32, fetched: &AtomicU64) -> Result<PullRequestListing, ClientError> {
        let range = filters.time_range(Utc::now(), self.default_lookback);
        let slices = slices(filters, range);
        log::info!(
            target: LOG_TARGET,
            "Large result set, fetching {} to {} in {} partitions",
            range.start.date_naive(),
            range.end.date_naive(),
            slices.len()
        );

        let mut listing = PullRequestListing::default();
        for (index, (slice_filters, window)) in slices.iter().enumerate() {
            if index > 0 && !self.partition_delay.is_zero() {
                tokio::time::sleep(self.partition_delay).await;
            }
            let slice = self.fetch_pages(slice_filters, page_size, Some(*window), fetched).await?;
            log::debug!(
                target: LOG_TARGET,
                "Partition {}/{} ({:?} to {:?}): {} pull requests",
                index + 1,
                slices.len(),
                slice_filters.created_after,
                slice_filters.created_before,
                slice.records.len()
            );
            listing.append(slice);
        }
        Ok(listing)
    }

    /// Follows continuation tokens until the listing is exhausted or the page cap is reached.
    ///
    /// With `window` set, records created outside it are dropped so adjoining partitions never
    /// return the same record twice.
    async fn fetch_pages(
        &self,
        filters: &PullRequestFilters,
        page_size: u32,
        window: Option<Window>,
        fetched: &AtomicU64,
    ) -> Result<PullRequestListing, ClientError> {
        let mut listing = PullRequestListing::default();
        let mut continuation: Option<String> = None;

        for page_number in 1..=self.max_pages {
            let url = self.list_url(filters, page_size, continuation.as_deref());
            let response = self.get(url, "list pull requests").await?;
            let next = header_value(response.headers(), CONTINUATION_HEADER).filter(|t| !t.is_empty());
            let page: PullRequestPage = decode(response, "list pull requests").await?;

            let received = page.value.len();
            let (records, malformed) = page.into_records();
            let before = listing.records.len();
            listing
                .records
                .extend(records.into_iter().filter(|pr| window.is_none_or(|w| w.contains(pr.creation_date))));
            listing.malformed.extend(malformed);
            let _ = fetched.fetch_add((listing.records.len() - before) as u64, Ordering::Relaxed);
            log::debug!(target: LOG_TARGET, "Page {page_number}: {received} pull requests");

            match next {
                Some(token) if received > 0 => continuation = Some(token),
                _ => return Ok(listing),
            }
        }

        log::warn!(
            target: LOG_TARGET,
            "Stopped after {} pages; results may be incomplete (raise api.pagination.max_pages to fetch more)",
            self.max_pages
        );
        Ok(listing)
    }

    async fn get(&self, url: Url, operation: &'static str) -> Result<reqwest::Response, ClientError> {
        get_with_retry(&self.http, &self.limiter, url, self.token.clone(), self.retry, operation).await
    }

    fn list_url(&self, filters: &PullRequestFilters, top: u32, continuation: Option<&str>) -> Url {
        let mut url = match &self.repository {
            Some(repository) => self.url(&[
                self.organization.as_str(),
                self.project.as_str(),
                "_apis",
                "git",
                "repositories",
                repository.as_str(),
                "pullrequests",
            ]),
            None => self.url(&[self.organization.as_str(), self.project.as_str(), "_apis", "git", "pullrequests"]),
        };

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in filters.query_params() {
                let _ = query.append_pair(name, &value);
            }
            let _ = query.append_pair("$top", &top.to_string());
            if let Some(token) = continuation {
                let _ = query.append_pair("continuationToken", token);
            }
        }
        url
    }

    /// `{base_url}/{segments...}?api-version={version}`
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            let _ = path.pop_if_empty().extend(segments);
        }
        let _ = url.query_pairs_mut().append_pair("api-version", &self.api_version);
        url
    }
}

impl Debug for ApiClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("repository", &self.repository)
            .field("api_version", &self.api_version)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("limiter", &self.limiter)
            .field("pagination", &self.pagination)
            .field("retry", &self.retry)
            .field("progress", &"<progress>")
            .finish_non_exhaustive()
    }
}

/// Filters and windows that cover `range` and any side `filters` leave open, without gaps
/// or overlap.
fn slices(filters: &PullRequestFilters, range: TimeRange) -> Vec<(PullRequestFilters, Window)> {
    let mut slices = Vec::new();

    if filters.is_open_start() {
        let before = PullRequestFilters {
            created_after: None,
            created_before: Some(range.start),
            ..filters.clone()
        };
        let window = Window {
            range: TimeRange::new(DateTime::<Utc>::MIN_UTC, range.start),
            end_inclusive: false,
        };
        slices.push((before, window));
    }

    let partitions = PaginationStrategy::partition(range);
    let last = partitions.len().saturating_sub(1);
    for (index, partition) in partitions.into_iter().enumerate() {
        let window = Window {
            range: partition,
            end_inclusive: index == last && !filters.is_open_end(),
        };
        slices.push((filters.within(partition), window));
    }

    if filters.is_open_end() {
        let after = PullRequestFilters {
            created_after: Some(range.end),
            created_before: None,
            ..filters.clone()
        };
        let window = Window {
            range: TimeRange::new(range.end, DateTime::<Utc>::MAX_UTC),
            end_inclusive: true,
        };
        slices.push((after, window));
    }

    slices
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(|v| v.trim().to_string())
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, operation: &'static str) -> Result<T, ClientError> {
    let url = response.url().to_string();
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::new(operation, url.clone(), classify(&e)).with_source(e))?;
    serde_json::from_slice(&body).map_err(|e| ClientError::new(operation, url, ClientErrorKind::Decode).with_source(e))
}
