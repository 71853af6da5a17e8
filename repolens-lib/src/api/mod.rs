//! Azure DevOps REST client.
//!
//! [`ApiClient`] pages through the pull request listing under a sliding-window [`RateLimiter`],
//! retries transient failures through `seatbelt` with exponential backoff, and switches to
//! time-partitioned fetching when the [`PaginationStrategy`] expects a large result set.

mod client;
mod filters;
mod pagination;
mod rate_limiter;
mod retry;

pub use client::{ApiClient, ProbeResult, PullRequestListing};
pub use filters::{PullRequestFilters, StatusFilter};
pub use pagination::{FetchStrategy, PaginationStrategy, PartitionGranularity, TimeRange};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, get_with_retry};
