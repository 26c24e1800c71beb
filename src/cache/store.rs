//! Bounded TTL cache for refinement results.
//!
//! # Responsibilities
//! - Memoize refined text by canonical request key
//! - Expire entries older than the TTL
//! - Evict the least-recently-used entry when full
//!
//! # Invariants
//! - `len() <= max_size()`
//! - an entry is never returned once `now - created_at > ttl`

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;

/// A cached refinement result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The refined text.
    pub value: String,
    /// When the value was stored.
    pub created_at: Instant,
    /// Number of times the value was served.
    pub hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Counters describing cache effectiveness since creation (or `clear`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
}

struct Slot {
    entry: CacheEntry,
    /// Recency stamp; the smallest stamp is the least recently used.
    tick: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    /// tick → key, ascending from least to most recently used.
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    stats: CacheStats,
}

impl CacheState {
    fn stamp(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.stamp();
        if let Some(slot) = self.slots.get_mut(key) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot.entry)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.slots.remove(&key);
        Some(key)
    }
}

/// A thread-safe, bounded result cache with TTL expiry and LRU eviction.
pub struct ResultCache {
    inner: Mutex<CacheState>,
    max_size: usize,
    ttl: Duration,
}

impl ResultCache {
    /// Create an empty cache. A `max_size` of zero is raised to one.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheState::default()),
            max_size: max_size.max(1),
            ttl,
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // is still safe to use.
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live value, counting the hit and marking it most recently used.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut state = self.state();

        let expired = match state.slots.get(key) {
            None => {
                state.stats.misses += 1;
                metrics::record_cache_event("miss");
                return None;
            }
            Some(slot) => slot.entry.is_expired(now, self.ttl),
        };

        if expired {
            state.remove(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            metrics::record_cache_event("expiration");
            metrics::record_cache_event("miss");
            metrics::record_cache_size(state.slots.len());
            tracing::trace!(key = %key, "Cache entry expired");
            return None;
        }

        state.touch(key);
        state.stats.hits += 1;
        metrics::record_cache_event("hit");
        let slot = state.slots.get_mut(key)?;
        slot.entry.hit_count += 1;
        Some(slot.entry.value.clone())
    }

    /// Store a value. Updating an existing key never evicts another entry.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let entry = CacheEntry {
            value: value.into(),
            created_at: Instant::now(),
            hit_count: 0,
        };
        let mut state = self.state();

        if state.slots.contains_key(&key) {
            if let Some(slot) = state.slots.get_mut(&key) {
                slot.entry = entry;
            }
            state.touch(&key);
            return;
        }

        if state.slots.len() >= self.max_size {
            if let Some(evicted) = state.evict_lru() {
                state.stats.evictions += 1;
                metrics::record_cache_event("eviction");
                tracing::debug!(key = %evicted, "Evicted least recently used cache entry");
            }
        }

        let tick = state.stamp();
        state.recency.insert(tick, key.clone());
        state.slots.insert(key, Slot { entry, tick });
        metrics::record_cache_size(state.slots.len());
    }

    /// Whether a live entry exists. Does not count as a hit or change recency.
    pub fn has(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Copy of a live entry without counting a hit or changing recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut state = self.state();
        let entry = state.slots.get(key).map(|slot| slot.entry.clone())?;
        if entry.is_expired(now, self.ttl) {
            state.remove(key);
            state.stats.expirations += 1;
            metrics::record_cache_event("expiration");
            return None;
        }
        Some(entry)
    }

    /// Remove an entry. Returns true if it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state();
        let removed = state.remove(key).is_some();
        metrics::record_cache_size(state.slots.len());
        removed
    }

    /// Remove every entry and reset statistics.
    pub fn clear(&self) {
        let mut state = self.state();
        *state = CacheState::default();
        metrics::record_cache_size(0);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state();
        let expired: Vec<String> = state
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(now, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        state.stats.expirations += expired.len() as u64;
        metrics::record_cache_size(state.slots.len());
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Cache cleanup removed expired entries");
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.state().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            size: state.slots.len(),
            ..state.stats
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("max_size", &self.max_size)
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}
