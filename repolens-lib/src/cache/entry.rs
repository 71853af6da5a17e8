use chrono::{DateTime, TimeDelta, Utc};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Version of the persisted entry layout. Entries written with another version are discarded.
pub const SCHEMA_VERSION: u32 = 1;

/// Shortest lifetime an entry can have, so `expires_at` always lies after `created_at`.
const MIN_TTL: TimeDelta = TimeDelta::milliseconds(1);

/// A cached value plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub schema_version: u32,
    pub key: String,
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub data_size: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, data: T, data_size: u64, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            key: key.into(),
            data,
            created_at: now,
            expires_at: expiry(now, ttl),
            last_accessed_at: now,
            access_count: 0,
            data_size,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }
}

/// The bookkeeping fields of a persisted entry, without the payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntryHeader {
    pub schema_version: u32,
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl EntryHeader {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX).max(MIN_TTL);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
