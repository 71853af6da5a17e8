use super::{Association, PullRequest, PullRequestMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a processed record came from during a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    Network,
    MemoryCache,
    FileCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheProvenance {
    pub hit: bool,
    pub source: DataSource,
}

impl CacheProvenance {
    #[must_use]
    pub const fn fetched() -> Self {
        Self {
            hit: false,
            source: DataSource::Network,
        }
    }

    #[must_use]
    pub const fn cached(source: DataSource) -> Self {
        Self { hit: true, source }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    pub processed_at: DateTime<Utc>,
    pub cache: CacheProvenance,
}

/// A pull request together with everything computed for it in one collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPullRequest {
    pub pull_request: PullRequest,
    pub metrics: PullRequestMetrics,
    pub associations: Vec<Association>,
    pub processing: ProcessingMetadata,
}

impl ProcessedPullRequest {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.pull_request.id
    }
}

/// A pull request that could not be processed, reported in aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    /// Missing when the service sent a record without a readable id.
    pub pull_request_id: Option<u64>,
    pub title: String,
    pub reason: String,
}
