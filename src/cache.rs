//! TTL cache for finished explanation records
//!
//! Keyed by the input fingerprint's canonical form, so two requests that
//! differ only in prediction id or timestamp share an entry. Entries expire
//! after a configurable TTL and the least recently used entry is evicted
//! when the cache is full. All methods take `&self`; an internal mutex
//! guards the map so the engine can share one cache across worker threads.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::input::Fingerprint;
use crate::record::ExplanationRecord;

/// Configuration for the explanation cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false, `get` and `put` are no-ops
    pub enabled: bool,
    /// Time an entry stays valid, in milliseconds; 0 expires entries immediately
    pub ttl_ms: u64,
    /// Maximum number of cached records; 0 disables insertion
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 300_000,
            max_entries: 1024,
        }
    }
}

/// Counters describing cache behavior since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned a live record
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Records stored
    pub insertions: u64,
    /// Records evicted to make room
    pub evictions: u64,
    /// Records dropped because their TTL passed
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate in [0, 1]; 0 before the first lookup
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    record: ExplanationRecord,
    stored_at: Instant,
    last_access: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    access_counter: u64,
    stats: CacheStats,
}

impl CacheInner {
    /// Drop every entry older than the TTL
    fn purge_expired(&mut self, ttl_ms: u64) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !Self::expired(entry, ttl_ms));
        self.stats.expirations += (before - self.entries.len()) as u64;
    }

    fn expired(entry: &CacheEntry, ttl_ms: u64) -> bool {
        u64::try_from(entry.stored_at.elapsed().as_millis()).unwrap_or(u64::MAX) >= ttl_ms
    }

    /// Evict the least recently used entry
    fn evict_lru(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// Thread-safe TTL cache mapping fingerprints to explanation records
pub struct ExplanationCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl ExplanationCache {
    /// Create a cache with the given configuration
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Look up a live record for `fingerprint`
    ///
    /// An expired entry is removed and counted as both an expiration and a
    /// miss. Returns a clone so the caller never holds the cache lock.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ExplanationRecord> {
        if !self.config.enabled {
            return None;
        }
        let mut inner = self.lock();

        let key = fingerprint.canonical();
        let expired = inner
            .entries
            .get(key)
            .map(|entry| CacheInner::expired(entry, self.config.ttl_ms));
        match expired {
            Some(true) => {
                inner.entries.remove(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                None
            }
            Some(false) => {
                inner.access_counter += 1;
                inner.stats.hits += 1;
                let counter = inner.access_counter;
                let entry = inner.entries.get_mut(key)?;
                entry.last_access = counter;
                Some(entry.record.clone())
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store a record under `fingerprint`, replacing any previous entry
    ///
    /// Expired entries are purged first; if the cache is still full the
    /// least recently used entry is evicted.
    pub fn put(&self, fingerprint: &Fingerprint, record: ExplanationRecord) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }
        let mut inner = self.lock();

        let key = fingerprint.canonical().to_string();
        if !inner.entries.contains_key(&key) {
            inner.purge_expired(self.config.ttl_ms);
            if inner.entries.len() >= self.config.max_entries {
                inner.evict_lru();
            }
        }

        inner.access_counter += 1;
        inner.stats.insertions += 1;
        let entry = CacheEntry {
            record,
            stored_at: Instant::now(),
            last_access: inner.access_counter,
        };
        inner.entries.insert(key, entry);
    }

    /// Remove every entry; counters survive the clear
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.access_counter = 0;
    }

    /// Number of cached records, including any not yet purged as expired
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the behavior counters
    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    /// Fill level in [0, 1]
    pub fn utilization(&self) -> f64 {
        if self.config.max_entries == 0 {
            0.0
        } else {
            self.len() as f64 / self.config.max_entries as f64
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // Mutations under the lock are single-step, so a poisoned map is
        // still internally consistent and safe to reuse.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExplanationCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
