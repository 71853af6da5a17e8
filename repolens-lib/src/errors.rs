//! Typed errors for the pull-request integration subsystem.
//!
//! The command layer works with `ohno::AppError`; everything below it reports failures through
//! these types so callers can tell configuration, connectivity, client, cache, and per-item
//! failures apart.

use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};
use core::time::Duration;
use std::io;
use std::path::PathBuf;

/// Top-level failure of the integration subsystem.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    /// Required settings are missing or malformed.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// The initial probe against the service failed.
    #[error("could not connect to Azure DevOps organization '{organization}', project '{project}'")]
    Connectivity {
        organization: String,
        project: String,
        #[source]
        source: ClientError,
    },

    /// A fetch failed after retries were exhausted.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Writing to the cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The collector was used out of order.
    #[error("collector is {actual}, expected it to be {expected}")]
    InvalidState { actual: String, expected: &'static str },
}

/// Problems found while resolving configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("'{0}' is required but was not provided")]
    Missing(&'static str),

    #[error("'{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// What went wrong with an HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// Connection reset, refused, or otherwise failed before a response arrived.
    Network,

    /// The request exceeded its timeout.
    Timeout,

    /// The service answered with a non-success status.
    Status(u16),

    /// The response body could not be decoded.
    Decode,

    /// The request could not be built.
    InvalidRequest,
}

impl ClientErrorKind {
    /// Whether a request failing this way is worth retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::Network | Self::Timeout => true,
            Self::Status(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Decode | Self::InvalidRequest => false,
        }
    }
}

impl Display for ClientErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Decode => write!(f, "malformed response"),
            Self::InvalidRequest => write!(f, "invalid request"),
        }
    }
}

/// A failed call to the Azure DevOps API.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed for '{url}' after {attempts} attempt(s): {kind}{}", detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
pub struct ClientError {
    pub operation: &'static str,
    pub url: String,
    pub kind: ClientErrorKind,
    pub attempts: u32,
    pub detail: Option<String>,

    /// Delay the service asked for before the next attempt.
    pub retry_after: Option<Duration>,
    #[source]
    pub source: Option<Box<dyn core::error::Error + Send + Sync>>,
}

impl ClientError {
    #[must_use]
    pub fn new(operation: &'static str, url: impl Into<String>, kind: ClientErrorKind) -> Self {
        Self {
            operation,
            url: url.into(),
            kind,
            attempts: 1,
            detail: None,
            retry_after: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl core::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub const fn with_retry_after(mut self, delay: Option<Duration>) -> Self {
        self.retry_after = delay;
        self
    }

    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// HTTP status of the failed response, if one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self.kind {
            ClientErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

/// A failure in either cache tier.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed for '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not serialize cache entry '{key}'")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not decode cache entry '{key}'")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not lock cache directory '{}'", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Failure while processing a single pull request. The batch continues without it.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("pull request {id} was closed at {closed} before it was created at {created}")]
    ClosedBeforeCreated {
        id: u64,
        created: DateTime<Utc>,
        closed: DateTime<Utc>,
    },

    #[error("malformed pull request record{}: {source}", id.map(|id| format!(" {id}")).unwrap_or_default())]
    Malformed {
        id: Option<u64>,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not cache pull request {id}")]
    Cache {
        id: u64,
        #[source]
        source: CacheError,
    },
}
