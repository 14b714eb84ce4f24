//! Result cache: which target last answered authoritatively for a name
//!
//! The engine records a `(normalized dn, target)` pair on every
//! authoritative success; candidate selection reads it back to narrow
//! later operations on the same entry to a single target.
//!
//! Writes are best-effort. Nothing in here can fail the operation that
//! triggered them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the DN cache.
#[derive(Debug, Clone)]
pub struct DnCacheConfig {
    /// How long an entry stays authoritative
    pub ttl: Duration,

    /// Maximum number of cached names
    pub max_entries: usize,
}

impl Default for DnCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached routing decision.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Index of the target that answered
    pub target: usize,

    /// Wall-clock time of the last refresh (for reporting)
    pub recorded_at: DateTime<Utc>,

    /// When this entry stops being used
    pub expires_at: Instant,

    last_used: Instant,
}

impl CacheEntry {
    fn new(target: usize, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            target,
            recorded_at: Utc::now(),
            expires_at: now + ttl,
            last_used: now,
        }
    }

    /// Check if this cache entry has expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Result Cache seam
// =============================================================================

/// Process-wide record of authoritative answers, shared across sessions.
pub trait ResultCache: Send + Sync {
    /// Remember that `target` answered for `ndn`. Fire-and-forget.
    fn record_success(&self, ndn: &str, target: usize);

    /// Target that last answered for `ndn`, if the record is still live
    fn lookup(&self, ndn: &str) -> Option<usize>;
}

// =============================================================================
// DnCache
// =============================================================================

/// DashMap-backed result cache with TTL and bounded size.
pub struct DnCache {
    entries: DashMap<String, CacheEntry>,
    config: DnCacheConfig,
    stats: CacheStats,
    /// Serializes inserts of new names so `max_entries` holds under concurrency
    admission: Mutex<()>,
}

impl DnCache {
    pub fn new(config: DnCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: CacheStats::default(),
            admission: Mutex::new(()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DnCacheConfig::default())
    }

    /// Remove all expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Full entry for a name, live or not
    pub fn entry(&self, ndn: &str) -> Option<CacheEntry> {
        self.entries.get(ndn).map(|e| e.clone())
    }

    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.last_used)
            .map(|e| e.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for DnCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ResultCache for DnCache {
    fn record_success(&self, ndn: &str, target: usize) {
        if self.config.max_entries == 0 {
            return;
        }

        // Refreshing a known name never changes the size
        let refreshed = self
            .entries
            .get_mut(ndn)
            .map(|mut entry| *entry = CacheEntry::new(target, self.config.ttl))
            .is_some();

        if !refreshed {
            let _admission = self
                .admission
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if !self.entries.contains_key(ndn)
                && self.entries.len() >= self.config.max_entries
                && self.cleanup() == 0
            {
                self.evict_lru();
            }
            self.entries
                .insert(ndn.to_string(), CacheEntry::new(target, self.config.ttl));
        }

        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
        debug!(ndn = %ndn, target_idx = target, "Cached authoritative target");
    }

    fn lookup(&self, ndn: &str) -> Option<usize> {
        let target = match self.entries.get_mut(ndn) {
            Some(mut entry) if !entry.is_expired() => {
                entry.last_used = Instant::now();
                Some(entry.target)
            }
            Some(_) => None,
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match target {
            Some(target) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(target)
            }
            None => {
                // Expired entries are inert; drop them on sight, unless a
                // writer refreshed the name in the meantime
                self.entries.remove_if(ndn, |_, entry| entry.is_expired());
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
