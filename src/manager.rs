//! Cache Manager - Unified Multi-Level Cache
//!
//! Orchestrates lookups through the tier hierarchy in fastest-to-slowest
//! order, back-fills faster tiers on a slower-tier hit, and funnels full
//! misses through the stampede guard to the external loader. Writes go
//! through to every tier; invalidation fans out through the invalidation
//! manager.
//!
//! The read path suspends only while waiting on an in-flight load; tier
//! probes are short lock-protected operations.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::events::{ChangeEvent, ChangeEventSource, EventPublisher, InvalidationReason, LoggingEventPublisher};
use crate::invalidation::InvalidationManager;
use crate::loader::Loader;
use crate::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use crate::stampede::StampedeGuard;
use crate::tier::{CacheTier, TierStats};

/// Marker payload for negative-cached load failures. NUL bytes keep it out
/// of the space of ordinary textual values.
static NEGATIVE_SENTINEL: Lazy<Bytes> =
    Lazy::new(|| Bytes::from_static(b"\0stratacache:negative\0"));

/// Unified multi-level cache manager
pub struct CacheManager {
    /// Tiers in lookup order, fastest first
    tiers: Vec<Arc<CacheTier>>,
    /// External load-by-key capability
    loader: Arc<dyn Loader>,
    /// Single-flight load deduplication
    guard: StampedeGuard,
    /// Invalidation fan-out and key/tag bookkeeping
    invalidation: Arc<InvalidationManager>,
    /// Metrics collector
    metrics: Arc<CacheMetrics>,
    /// Configuration
    config: CacheConfig,
    /// Cancels change listeners and scheduled invalidations
    shutdown: CancellationToken,
    /// Change-event listener tasks
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheManager {
    /// Create a cache manager with the default configuration
    pub fn new(loader: Arc<dyn Loader>) -> Result<Self> {
        Self::with_config(CacheConfig::default(), loader)
    }

    /// Create a cache manager with a custom configuration
    pub fn with_config(config: CacheConfig, loader: Arc<dyn Loader>) -> Result<Self> {
        Self::with_publisher(config, loader, Arc::new(LoggingEventPublisher::new()))
    }

    /// Create a cache manager with a custom event publisher
    pub fn with_publisher(
        config: CacheConfig,
        loader: Arc<dyn Loader>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        config.validate()?;

        let tiers: Vec<Arc<CacheTier>> = config
            .tiers
            .iter()
            .map(|tc| Arc::new(CacheTier::new(tc)))
            .collect();
        let metrics = Arc::new(CacheMetrics::new(
            config.tiers.iter().map(|t| t.name.clone()).collect(),
        ));
        let guard = StampedeGuard::new(config.loader_timeout, config.max_concurrent_loads);
        let invalidation = Arc::new(InvalidationManager::new(tiers.clone(), publisher));

        Ok(Self {
            tiers,
            loader,
            guard,
            invalidation,
            metrics,
            config,
            shutdown: CancellationToken::new(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Get a value, loading it through the external loader on a full miss.
    ///
    /// Concurrent callers missing on the same key share one loader
    /// invocation; all receive the same value or the same error. Loader
    /// failures are not cached unless negative caching is configured.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }

        if let Some(entry) = self.probe_tiers(key) {
            return self.unwrap_probe(key, entry);
        }

        let outcome = self.guard.load(key, Arc::clone(&self.loader)).await;

        if outcome.was_leader {
            match &outcome.result {
                Ok(value) => {
                    self.metrics.record_load();
                    self.store_loaded(key, value.clone());
                }
                Err(e) => {
                    match e {
                        Error::LoaderTimeout { .. } => self.metrics.record_load_timeout(),
                        _ => self.metrics.record_load_failure(),
                    }
                    if self.config.negative_caching {
                        self.store_negative(key);
                    }
                }
            }
        } else {
            self.metrics.record_flight_wait();
        }

        outcome.result
    }

    /// Get a value from the tiers only; never invokes the loader.
    ///
    /// A slower-tier hit still back-fills the faster tiers.
    pub fn try_get(&self, key: &str) -> Option<Bytes> {
        let entry = self.probe_tiers(key)?;
        if self.is_negative(&entry) {
            return None;
        }
        Some(entry.value().clone())
    }

    /// True if any tier holds a live entry for the key
    pub fn contains(&self, key: &str) -> bool {
        self.tiers.iter().any(|t| t.contains(key))
    }

    /// Probe tiers fastest-first; on a hit, back-fill every faster tier
    fn probe_tiers(&self, key: &str) -> Option<CacheEntry> {
        for (i, tier) in self.tiers.iter().enumerate() {
            let tracker = LatencyTracker::start();
            if let Some(entry) = tier.get(key) {
                self.metrics.record_hit(i);
                self.metrics.record_read_latency(i, tracker.elapsed());
                if i > 0 {
                    debug!(key = %key, tier = %tier.name(), "hit below fastest tier, back-filling");
                    self.backfill(i, key, &entry);
                }
                return Some(entry);
            }
            self.metrics.record_miss(i);
        }
        None
    }

    /// Copy a hit at tier `found_at` into every faster tier.
    ///
    /// The copy's TTL is capped by both the destination tier's default and
    /// the source entry's remaining lifetime, so back-fill never extends a
    /// value's life.
    fn backfill(&self, found_at: usize, key: &str, entry: &CacheEntry) {
        let remaining = entry.metadata.remaining_ttl();
        for (i, tier) in self.tiers.iter().enumerate().take(found_at).rev() {
            let ttl = match (tier.default_ttl(), remaining) {
                (Some(default), Some(left)) => Some(default.min(left)),
                (Some(default), None) => Some(default),
                (None, left) => left,
            };
            if let Err(e) = tier.put(key.to_string(), entry.restamped(ttl)) {
                warn!(tier = %tier.name(), key = %key, error = %e, "back-fill failed");
                self.metrics.record_error(i);
            }
        }
    }

    fn unwrap_probe(&self, key: &str, entry: CacheEntry) -> Result<Bytes> {
        if self.is_negative(&entry) {
            return Err(Error::Loader {
                key: key.to_string(),
                reason: "negative-cached load failure".to_string(),
            });
        }
        Ok(entry.value().clone())
    }

    fn is_negative(&self, entry: &CacheEntry) -> bool {
        self.config.negative_caching && entry.value() == &*NEGATIVE_SENTINEL
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Write a value through to every tier, each under its own default TTL
    pub async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.put_with_tags(key, value, Vec::new()).await
    }

    /// Write a tagged value through to every tier.
    ///
    /// Tags group keys for bulk invalidation. Per-tier failures are logged
    /// and do not roll back writes to other tiers; the first failure is
    /// surfaced after the full fan-out.
    pub async fn put_with_tags(&self, key: &str, value: Bytes, tags: Vec<String>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }

        let mut first_err = None;
        for (i, tier) in self.tiers.iter().enumerate() {
            let entry = CacheEntry::with_tags(value.clone(), tier.default_ttl(), tags.clone());
            if let Err(e) = tier.put(key.to_string(), entry) {
                warn!(tier = %tier.name(), key = %key, error = %e, "write-through put failed");
                self.metrics.record_error(i);
                first_err.get_or_insert(e);
            }
        }
        self.invalidation.register(key, &tags);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Store a freshly loaded value in every tier (the loaded value wins
    /// over any invalidation that raced the load)
    fn store_loaded(&self, key: &str, value: Bytes) {
        for (i, tier) in self.tiers.iter().enumerate() {
            let entry = CacheEntry::new(value.clone(), tier.default_ttl());
            if let Err(e) = tier.put(key.to_string(), entry) {
                warn!(tier = %tier.name(), key = %key, error = %e, "post-load store failed");
                self.metrics.record_error(i);
            }
        }
        self.invalidation.register(key, &[]);
    }

    /// Hold a load failure in the fastest tier for the configured window
    fn store_negative(&self, key: &str) {
        let tier = &self.tiers[0];
        let entry = CacheEntry::new(NEGATIVE_SENTINEL.clone(), Some(self.config.negative_ttl));
        if let Err(e) = tier.put(key.to_string(), entry) {
            warn!(tier = %tier.name(), key = %key, error = %e, "negative-cache store failed");
            self.metrics.record_error(0);
        } else {
            self.invalidation.register(key, &[]);
        }
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Remove a key from every tier; idempotent
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.invalidation.invalidate(key).await;
        if removed {
            self.metrics.record_invalidation();
        }
        removed
    }

    /// Remove every key carrying the tag from every tier
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let removed = self.invalidation.invalidate_by_tag(tag).await;
        for _ in 0..removed {
            self.metrics.record_invalidation();
        }
        removed
    }

    /// Remove every known key matching the regex pattern from every tier.
    ///
    /// Scans the key registry: O(known keys), not for hot paths.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let removed = self.invalidation.invalidate_by_pattern(pattern).await?;
        for _ in 0..removed {
            self.metrics.record_invalidation();
        }
        Ok(removed)
    }

    /// Invalidate a key after a delay; rescheduling replaces the pending
    /// timer (last writer wins)
    pub fn schedule_invalidation(&self, key: &str, delay: Duration) {
        self.invalidation.schedule_invalidation(key, delay);
    }

    /// Subscribe to an external change-event source.
    ///
    /// Entity events invalidate their key, tag events fan out over the tag
    /// index. The listener stops at shutdown or when the source ends.
    pub fn subscribe<S>(&self, mut source: S)
    where
        S: ChangeEventSource + 'static,
    {
        let invalidation = Arc::clone(&self.invalidation);
        let metrics = Arc::clone(&self.metrics);
        let token = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = source.next_event() => event,
                };
                match event {
                    Some(ChangeEvent::EntityUpdated { key })
                    | Some(ChangeEvent::EntityDeleted { key }) => {
                        if invalidation
                            .invalidate_with_reason(&key, InvalidationReason::ChangeNotification)
                            .await
                        {
                            metrics.record_invalidation();
                        }
                    }
                    Some(ChangeEvent::TagChanged { tag }) => {
                        let n = invalidation.invalidate_by_tag(&tag).await;
                        for _ in 0..n {
                            metrics.record_invalidation();
                        }
                    }
                    None => break,
                }
            }
        });
        self.listeners.lock().push(handle);
    }

    // =========================================================================
    // Warming and maintenance
    // =========================================================================

    /// Bulk-load keys that are missing from every tier.
    ///
    /// Uses the loader's batch operation under the configured timeout and
    /// writes the results through all tiers. Returns how many keys were
    /// populated.
    pub async fn warm(&self, keys: &[String]) -> Result<usize> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }

        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !self.contains(k))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let loaded = tokio::time::timeout(
            self.config.loader_timeout,
            self.loader.load_batch(&missing),
        )
        .await
        .map_err(|_| Error::LoaderTimeout {
            key: format!("batch[{}]", missing.len()),
            timeout_ms: self.config.loader_timeout.as_millis() as u64,
        })??;

        let mut populated = 0;
        for (key, value) in loaded {
            self.store_loaded(&key, value);
            self.metrics.record_load();
            populated += 1;
        }
        debug!(requested = keys.len(), populated, "cache warmed");
        Ok(populated)
    }

    /// Sweep expired entries from every tier and compact the invalidation
    /// registries
    pub fn purge_expired(&self) -> usize {
        let purged: usize = self.tiers.iter().map(|t| t.purge_expired()).sum();
        self.invalidation.prune();
        purged
    }

    /// Remove all entries from all tiers and clear the registries
    pub async fn clear(&self) {
        for tier in &self.tiers {
            tier.clear();
        }
        self.invalidation.prune();
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Get a metrics snapshot
    pub fn statistics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get per-tier statistics
    pub fn tier_stats(&self) -> Vec<TierStats> {
        self.tiers.iter().map(|t| t.stats()).collect()
    }

    /// The tier hierarchy, fastest first
    pub fn tiers(&self) -> &[Arc<CacheTier>] {
        &self.tiers
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Loads currently in flight
    pub fn in_flight_loads(&self) -> usize {
        self.guard.in_flight_count()
    }

    /// Stop background work: change listeners and scheduled invalidations.
    ///
    /// Subsequent `get`/`put`/`warm` calls fail with [`Error::Shutdown`].
    /// Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.invalidation.shutdown();
        for handle in self.listeners.lock().drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("tiers", &self.tiers)
            .field("in_flight_loads", &self.guard.in_flight_count())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
