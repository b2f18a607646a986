//! Cache Entry Types
//!
//! A cache entry couples an opaque payload with the access bookkeeping
//! needed for TTL expiry and recency/frequency-based eviction.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// TTLs are tracked at millisecond resolution; second granularity is too
/// coarse for short-lived entries.
#[inline]
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Metadata for cache entries
///
/// Access fields are atomics so a shared entry can record reads without an
/// exclusive borrow.
#[derive(Debug)]
pub struct EntryMetadata {
    /// Creation timestamp (epoch milliseconds)
    created_at_ms: u64,
    /// TTL in milliseconds (0 = no expiry)
    ttl_ms: u64,
    /// Last access timestamp (epoch milliseconds)
    last_access_ms: AtomicU64,
    /// Access count for frequency-based eviction
    access_count: AtomicU32,
}

impl EntryMetadata {
    /// Create new entry metadata, optionally with a TTL
    pub fn new(ttl: Option<Duration>) -> Self {
        let now = epoch_millis();
        Self {
            created_at_ms: now,
            ttl_ms: ttl.map(|t| t.as_millis() as u64).unwrap_or(0),
            last_access_ms: AtomicU64::new(now),
            access_count: AtomicU32::new(1),
        }
    }

    /// Record an access and return the new count
    #[inline]
    pub fn record_access(&self) -> u32 {
        self.last_access_ms.store(epoch_millis(), Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get access count
    #[inline]
    pub fn access_count(&self) -> u32 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Get last access time (epoch milliseconds)
    #[inline]
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    /// Get creation time (epoch milliseconds)
    #[inline]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Expiry deadline (epoch milliseconds), if a TTL was set
    #[inline]
    pub fn expires_at_ms(&self) -> Option<u64> {
        if self.ttl_ms == 0 {
            None
        } else {
            Some(self.created_at_ms + self.ttl_ms)
        }
    }

    /// Check if the entry has passed its expiry deadline
    #[inline]
    pub fn is_expired(&self) -> bool {
        match self.expires_at_ms() {
            Some(deadline) => epoch_millis() >= deadline,
            None => false,
        }
    }

    /// Time left before expiry; `None` means no TTL was set
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at_ms()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(epoch_millis())))
    }

    /// Calculate eviction score (higher = more likely to evict)
    ///
    /// Combines recency and frequency: age / (frequency + 1).
    pub fn eviction_score(&self) -> f64 {
        let age_ms = epoch_millis().saturating_sub(self.last_access_ms()) as f64;
        let frequency = self.access_count() as f64;
        age_ms / (frequency + 1.0)
    }
}

impl Clone for EntryMetadata {
    fn clone(&self) -> Self {
        Self {
            created_at_ms: self.created_at_ms,
            ttl_ms: self.ttl_ms,
            last_access_ms: AtomicU64::new(self.last_access_ms.load(Ordering::Relaxed)),
            access_count: AtomicU32::new(self.access_count.load(Ordering::Relaxed)),
        }
    }
}

/// Cache entry containing a payload, metadata, and invalidation tags
#[derive(Clone)]
pub struct CacheEntry {
    /// Entry metadata
    pub metadata: EntryMetadata,
    /// Cached payload (zero-copy via `Bytes`)
    value: Bytes,
    /// Caller-assigned grouping labels for bulk invalidation
    tags: Arc<[String]>,
}

impl CacheEntry {
    /// Create a new cache entry, optionally with a TTL
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            metadata: EntryMetadata::new(ttl),
            value,
            tags: Arc::from(Vec::new()),
        }
    }

    /// Create a new tagged cache entry
    pub fn with_tags(value: Bytes, ttl: Option<Duration>, tags: Vec<String>) -> Self {
        Self {
            metadata: EntryMetadata::new(ttl),
            value,
            tags: Arc::from(tags),
        }
    }

    /// Re-stamp the entry with a fresh creation time and a new TTL.
    ///
    /// Used when copying a value into another tier: access bookkeeping is
    /// carried over, the expiry clock restarts under the new TTL.
    pub fn restamped(&self, ttl: Option<Duration>) -> Self {
        let metadata = EntryMetadata::new(ttl);
        metadata
            .access_count
            .store(self.metadata.access_count(), Ordering::Relaxed);
        Self {
            metadata,
            value: self.value.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Get the payload (zero-copy)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Payload size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// Get the invalidation tags
    #[inline]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Record access
    #[inline]
    pub fn record_access(&self) -> u32 {
        self.metadata.record_access()
    }

    /// Check if expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.metadata.is_expired()
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("size", &self.size())
            .field("tags", &self.tags)
            .field("access_count", &self.metadata.access_count())
            .field("is_expired", &self.is_expired())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
