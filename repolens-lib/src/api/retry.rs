//! Resilient GET requests using retry and timeout middleware.

use super::rate_limiter::RateLimiter;
use crate::errors::{ClientError, ClientErrorKind};
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use layered::{Execute, Service, Stack};
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use std::sync::Arc;
use tick::Clock;
use url::Url;

/// Log target for retries
const LOG_TARGET: &str = "     retry";

/// Longest body excerpt carried in an error.
const DETAIL_LIMIT: usize = 512;

/// Retry and timeout settings for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries on top of the original attempt.
    pub max_retries: u32,

    /// First backoff delay; each retry doubles it.
    pub base_delay: Duration,

    /// Limit for a single attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            timeout,
        }
    }
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub(super) fn classify(error: &reqwest::Error) -> ClientErrorKind {
    if error.is_timeout() {
        ClientErrorKind::Timeout
    } else if error.is_builder() {
        ClientErrorKind::InvalidRequest
    } else if error.is_decode() || error.is_body() {
        ClientErrorKind::Decode
    } else {
        ClientErrorKind::Network
    }
}

/// Classify the outcome of one attempt for retry purposes.
fn recovery(result: &Result<reqwest::Response, ClientError>) -> RecoveryInfo {
    match result {
        Err(e) if e.is_retryable() => e
            .retry_after
            .map_or_else(RecoveryInfo::retry, |delay| RecoveryInfo::retry().delay(delay)),
        _ => RecoveryInfo::never(),
    }
}

/// One attempt: takes a rate-limiter slot, sends the request, and turns a non-success status
/// into a [`ClientError`].
async fn attempt(
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    url: Url,
    token: Option<Arc<str>>,
    operation: &'static str,
) -> Result<reqwest::Response, ClientError> {
    let mut builder = client.get(url.clone()).header(ACCEPT, "application/json");
    if let Some(token) = token.as_deref() {
        builder = builder.basic_auth("", Some(token));
    }

    limiter.wait_if_needed().await;
    let response = builder
        .send()
        .await
        .map_err(|e| ClientError::new(operation, url.as_str(), classify(&e)).with_source(e))?;
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    let mut error = ClientError::new(operation, url.as_str(), ClientErrorKind::Status(status)).with_retry_after(retry_after);
    if !body.is_empty() {
        error = error.with_detail(body.chars().take(DETAIL_LIMIT).collect::<String>());
    }
    Err(error)
}

/// Sends an authenticated GET, retrying retryable failures per `policy`.
///
/// Every attempt takes a slot from `limiter` first. Non-retryable failures return immediately;
/// retryable ones back off exponentially, honoring `Retry-After` when the service sends it.
pub async fn get_with_retry(
    client: &reqwest::Client,
    limiter: &Arc<RateLimiter>,
    url: Url,
    token: Option<Arc<str>>,
    policy: RetryPolicy,
    operation: &'static str,
) -> Result<reqwest::Response, ClientError> {
    let clock = Clock::new_tokio();
    let context = ResilienceContext::new(&clock).name(operation);
    let attempts = Arc::new(AtomicU32::new(0));
    let timeout_url = url.to_string();

    let client = client.clone();
    let limiter = Arc::clone(limiter);
    let counter = Arc::clone(&attempts);
    let service = (
        Retry::layer("retry", &context)
            .clone_input()
            .recovery_with(|result: &Result<reqwest::Response, ClientError>, _| recovery(result))
            .max_retry_attempts(policy.max_retries)
            .base_delay(policy.base_delay)
            .backoff(Backoff::Exponential)
            .on_retry(move |_output, args| {
                log::debug!(
                    target: LOG_TARGET,
                    "Retrying {operation} (attempt {}, delay {}ms)",
                    args.attempt().index() + 1,
                    args.retry_delay().as_millis(),
                );
            }),
        Timeout::layer("timeout", &context)
            .timeout_error(move |_| ClientError::new(operation, timeout_url.clone(), ClientErrorKind::Timeout))
            .timeout(policy.timeout),
        Execute::new(move |url: Url| {
            let _ = counter.fetch_add(1, Ordering::Relaxed);
            attempt(client.clone(), Arc::clone(&limiter), url, token.clone(), operation)
        }),
    )
        .into_service();

    let result = service.execute(url).await;
    let attempts = attempts.load(Ordering::Relaxed).max(1);
    result.map_err(|e| {
        if e.is_retryable() {
            log::warn!(target: LOG_TARGET, "Giving up on {operation} after {attempts} attempt(s): {}", e.kind);
        }
        e.with_attempts(attempts)
    })
}
