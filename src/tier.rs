//! Cache Tier
//!
//! One level of the cache hierarchy: a bounded entry map plus eviction
//! policy. The entry map and the policy's bookkeeping mutate under a single
//! mutex so they can never drift apart; every operation is one short
//! critical section.
//!
//! Expired entries are dropped lazily on the access path. A tier never
//! holds more entries than its configured capacity: inserting a new key
//! into a full tier evicts exactly one policy-chosen victim first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::error;

use crate::config::TierConfig;
use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::policy::{self, EvictionPolicy, PolicyKind};

struct TierInner {
    entries: HashMap<String, CacheEntry>,
    policy: Box<dyn EvictionPolicy>,
}

/// A single bounded cache level
pub struct CacheTier {
    name: String,
    capacity: usize,
    default_ttl: Option<Duration>,
    policy_kind: PolicyKind,
    inner: Mutex<TierInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheTier {
    /// Create a tier from its configuration
    pub fn new(config: &TierConfig) -> Self {
        Self {
            name: config.name.clone(),
            capacity: config.capacity,
            default_ttl: config.ttl,
            policy_kind: config.policy,
            inner: Mutex::new(TierInner {
                entries: HashMap::with_capacity(config.capacity.min(1_024)),
                policy: policy::build(config.policy),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Tier name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum entry count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Default TTL applied by the manager when writing to this tier
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Configured eviction strategy
    pub fn policy_kind(&self) -> PolicyKind {
        self.policy_kind
    }

    /// Get an entry, updating recency/frequency bookkeeping.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let live = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.record_access();
                Some(entry.clone())
            }
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match live {
            Some(entry) => {
                inner.policy.on_access(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                // Passed its deadline: drop lazily, report a miss
                inner.entries.remove(key);
                inner.policy.on_remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Check for a live entry without touching eviction bookkeeping
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Insert or replace an entry.
    ///
    /// A replaced key re-enters the policy as a fresh insertion. When a new
    /// key would exceed capacity, the policy's victim is evicted first; a
    /// full tier with no victim is an invariant violation.
    pub fn put(&self, key: String, entry: CacheEntry) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&key) {
            inner.policy.on_remove(&key);
            inner.policy.on_insert(&key);
            inner.entries.insert(key, entry);
            return Ok(());
        }

        if inner.entries.len() >= self.capacity {
            match inner.policy.select_victim() {
                Some(victim) => {
                    inner.entries.remove(&victim);
                    inner.policy.on_remove(&victim);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    let err = Error::CapacityViolation {
                        tier: self.name.clone(),
                        len: inner.entries.len(),
                        capacity: self.capacity,
                    };
                    error!(tier = %self.name, "{}", err);
                    return Err(err);
                }
            }
        }

        inner.policy.on_insert(&key);
        inner.entries.insert(key, entry);
        debug_assert_eq!(inner.entries.len(), inner.policy.len());
        Ok(())
    }

    /// Remove an entry and its policy bookkeeping; no-op if absent
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.remove(key).is_some() {
            inner.policy.on_remove(key);
            true
        } else {
            false
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
            inner.policy.on_remove(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Number of entries currently held (expired-but-unswept included)
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if no entries are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys currently held
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    /// Remove all entries and bookkeeping
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner.entries.keys().cloned().collect();
        for key in keys {
            inner.policy.on_remove(&key);
        }
        inner.entries.clear();
    }

    /// Hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Lazy-expiry removal count
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Get tier statistics
    pub fn stats(&self) -> TierStats {
        let hits = self.hits();
        let misses = self.misses();
        let total = hits + misses;
        TierStats {
            name: self.name.clone(),
            entries: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            evictions: self.evictions(),
            expirations: self.expirations(),
        }
    }
}

impl std::fmt::Debug for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTier")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy_kind)
            .field("entries", &self.len())
            .finish()
    }
}

/// Point-in-time tier statistics
#[derive(Debug, Clone)]
pub struct TierStats {
    /// Tier name
    pub name: String,
    /// Current entry count
    pub entries: usize,
    /// Maximum entry count
    pub capacity: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Eviction count
    pub evictions: u64,
    /// Lazy-expiry removal count
    pub expirations: u64,
}

// =============================================================================
// Tests
// =============================================================================
