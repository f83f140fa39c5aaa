//! Time-bounded cache store keyed by request signature.
//!
//! Uses DashMap for concurrent access with per-key sharding. Expired entries
//! are treated as absent and evicted lazily on the next lookup; when the store
//! grows past its capacity the least recently accessed entry is evicted.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current instant.
///
/// Swappable so TTL behavior can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock. Clones share the same time.
///
/// ```
/// use resource_kit::store::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(90));
/// assert_eq!(clock.now() - start, Duration::from_secs(90));
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// One cached response.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub signature: String,
    pub payload: V,
    pub stored_at: Instant,
    /// `None` never expires.
    pub ttl: Option<Duration>,
    last_access: Instant,
}

impl<V> CacheEntry<V> {
    fn new(signature: String, payload: V, ttl: Option<Duration>, now: Instant) -> Self {
        CacheEntry {
            signature,
            payload,
            stored_at: now,
            ttl,
            last_access: now,
        }
    }

    /// Valid while `now - stored_at < ttl`.
    pub fn is_valid(&self, now: Instant) -> bool {
        self.ttl
            .map_or(true, |ttl| now.saturating_duration_since(self.stored_at) < ttl)
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe cache store.
///
/// A `max_entries` of zero disables the capacity bound.
pub struct CacheStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        CacheStore {
            entries: DashMap::new(),
            clock,
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a valid entry. Expired entries are removed and reported as a miss.
    pub fn get(&self, signature: &str) -> Option<V> {
        let now = self.clock.now();

        let expired = match self.entries.get_mut(signature) {
            Some(mut entry) if entry.is_valid(now) => {
                entry.last_access = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✓ Store GET {} -> HIT", signature);
                return Some(entry.payload.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries
                .remove_if(signature, |_, entry| !entry.is_valid(now));
            debug!("✓ Store GET {} -> EXPIRED", signature);
        } else {
            debug!("✓ Store GET {} -> MISS", signature);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Whether a valid entry exists. Does not touch statistics or recency.
    pub fn contains(&self, signature: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(signature)
            .is_some_and(|entry| entry.is_valid(now))
    }

    /// Store or overwrite an entry.
    pub fn insert(&self, signature: &str, payload: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        self.entries.insert(
            signature.to_string(),
            CacheEntry::new(signature.to_string(), payload, ttl, now),
        );
        match ttl {
            Some(d) => debug!("✓ Store SET {} (TTL: {:?})", signature, d),
            None => debug!("✓ Store SET {}", signature),
        }
        self.evict_over_capacity();
    }

    pub fn remove(&self, signature: &str) -> bool {
        let removed = self.entries.remove(signature).is_some();
        if removed {
            debug!("✓ Store DELETE {}", signature);
        }
        removed
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!("✓ Store CLEAR ({} entries)", count);
        count
    }

    /// Eagerly drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!("Store purge: removed {} expired entries", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        StoreStats {
            entries: self.entries.len(),
            expired: self
                .entries
                .iter()
                .filter(|entry| !entry.is_valid(now))
                .count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_over_capacity(&self) {
        if self.max_entries == 0 {
            return;
        }
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_access)
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else {
                break;
            };
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Store evicted least recently used entry {}", key);
        }
    }
}
