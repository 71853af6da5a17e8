use super::clock::Clock;
use super::entry::expiry;
use chrono::{DateTime, Utc};
use core::any::Any;
use core::num::NonZeroUsize;
use core::time::Duration;
use lru::LruCache;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Log target for the memory cache
const LOG_TARGET: &str = "    memory";

struct Slot {
    value: Arc<dyn Any + Send + Sync>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_count: u64,
    data_size: u64,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

struct State {
    /// Entries in recency order; `get` and `set` move a key to the front.
    slots: LruCache<String, Slot>,

    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl State {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.slots.pop(key).is_some()
    }
}

/// Point-in-time figures for a [`MemoryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,

    /// Hits summed over the entries currently held.
    pub entry_hits: u64,

    /// Creation time of the oldest entry held.
    pub oldest_entry_at: Option<DateTime<Utc>>,
}

/// A bounded, TTL'd, least-recently-used in-process cache.
///
/// Values of any type can be stored side by side. Reading a key with a type other than the one it
/// was stored with counts as a miss.
pub struct MemoryCache {
    max_entries: NonZeroUsize,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl core::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_entries", &self.max_entries)
            .field("default_ttl", &self.default_ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl MemoryCache {
    #[must_use]
    pub fn new(max_entries: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            max_entries: capacity,
            default_ttl,
            clock,
            state: Mutex::new(State::new(capacity)),
        }
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut guard = self.state.lock().expect("lock poisoned");
        let state = &mut *guard;

        let Some(slot) = state.slots.peek(key) else {
            state.misses += 1;
            return None;
        };

        if slot.is_expired(now) {
            let _ = state.remove(key);
            state.expirations += 1;
            state.misses += 1;
            log::trace!(target: LOG_TARGET, "Entry '{key}' expired");
            return None;
        }

        let Some(value) = slot.value.downcast_ref::<T>().cloned() else {
            state.misses += 1;
            log::debug!(target: LOG_TARGET, "Entry '{key}' holds a different type, treating as a miss");
            return None;
        };

        if let Some(slot) = state.slots.get_mut(key) {
            slot.access_count += 1;
        }
        state.hits += 1;
        Some(value)
    }

    /// Stores a value, evicting the least recently used entry if a new key would exceed capacity.
    ///
    /// `ttl` falls back to the cache's default when `None`.
    pub fn set<T: Serialize + Send + Sync + 'static>(&self, key: &str, value: T, ttl: Option<Duration>) {
        let now = self.clock.now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let data_size = serde_json::to_vec(&value).map_or(0, |bytes| bytes.len() as u64);

        let mut state = self.state.lock().expect("lock poisoned");
        if !state.slots.contains(key) && state.slots.len() >= self.max_entries.get() {
            if let Some((victim, _)) = state.slots.pop_lru() {
                state.evictions += 1;
                log::debug!(target: LOG_TARGET, "Evicted least recently used entry '{victim}'");
            }
        }

        let _ = state.slots.put(
            key.to_string(),
            Slot {
                value: Arc::new(value),
                created_at: now,
                expires_at: expiry(now, ttl),
                access_count: 0,
                data_size,
            },
        );
    }

    /// Whether a live entry exists for `key`. Expired entries are removed on the way.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("lock poisoned");
        match state.slots.peek(key) {
            Some(slot) if slot.is_expired(now) => {
                let _ = state.remove(key);
                state.expirations += 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().expect("lock poisoned").remove(key)
    }

    /// Removes every entry and resets the counters.
    pub fn clear(&self) {
        *self.state.lock().expect("lock poisoned") = State::new(self.max_entries);
    }

    /// Removes all expired entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("lock poisoned");

        let expired: Vec<String> = state
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            let _ = state.remove(key);
        }
        state.expirations += expired.len() as u64;

        if !expired.is_empty() {
            log::debug!(target: LOG_TARGET, "Removed {} expired entries", expired.len());
        }
        expired.len()
    }

    #[must_use]
    pub fn stats(&self) -> MemoryCacheStats {
        let state = self.state.lock().expect("lock poisoned");
        let lookups = state.hits + state.misses;

        #[expect(clippy::cast_precision_loss, reason = "counters stay far below 2^52")]
        let hit_rate = if lookups == 0 { 0.0 } else { state.hits as f64 / lookups as f64 };

        MemoryCacheStats {
            entries: state.slots.len(),
            max_entries: self.max_entries.get(),
            total_size: state.slots.iter().map(|(_, slot)| slot.data_size).sum(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            hit_rate,
            entry_hits: state.slots.iter().map(|(_, slot)| slot.access_count).sum(),
            oldest_entry_at: state.slots.iter().map(|(_, slot)| slot.created_at).min(),
        }
    }
}
