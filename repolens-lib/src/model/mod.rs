//! Records exchanged between the client, the linker, the cache, and the collector.

mod association;
mod commit;
mod metrics;
mod processed;
mod pull_request;

pub use association::{Association, LinkMethod};
pub use commit::CommitRecord;
pub use metrics::PullRequestMetrics;
pub use processed::{CacheProvenance, DataSource, ItemFailure, ProcessedPullRequest, ProcessingMetadata};
pub use pull_request::{
    CommitRef, CompletionOptions, Identity, MergeStrategy, PullRequest, PullRequestPage, PullRequestStatus, Reviewer, ReviewerVote,
};
