//! Invalidation Manager
//!
//! Fans removals out across every tier, by key, by tag, or by key pattern.
//! Maintains the tag->keys index and the key registry that make tag and
//! pattern targeting possible (tiers do not expose enumeration on the hot
//! path).
//!
//! Fan-out is best-effort per tier: one tier failing to drop a key does
//! not stop the others. Every invalidated key emits a [`CacheEvent`] for
//! observers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{CacheEvent, EventPublisher, InvalidationReason};
use crate::tier::CacheTier;

/// Invalidation fan-out and key/tag bookkeeping
pub struct InvalidationManager {
    tiers: Vec<Arc<CacheTier>>,
    /// All keys the engine has written and not yet invalidated
    keys: DashSet<String>,
    /// Tag -> keys carrying it
    tag_index: DashMap<String, HashSet<String>>,
    /// Key -> tags it carries (for index cleanup on removal)
    key_tags: DashMap<String, Vec<String>>,
    /// Pending delayed invalidations, last writer wins per key
    timers: DashMap<String, JoinHandle<()>>,
    publisher: Arc<dyn EventPublisher>,
    shutdown: CancellationToken,
}

impl InvalidationManager {
    /// Create a manager fanning out over the given tiers (fastest first)
    pub fn new(tiers: Vec<Arc<CacheTier>>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            tiers,
            keys: DashSet::new(),
            tag_index: DashMap::new(),
            key_tags: DashMap::new(),
            timers: DashMap::new(),
            publisher,
            shutdown: CancellationToken::new(),
        }
    }

    /// Track a written key and its tags.
    ///
    /// Called by the write path on every put so tag and pattern targeting
    /// can resolve keys later.
    pub fn register(&self, key: &str, tags: &[String]) {
        self.keys.insert(key.to_string());

        if tags.is_empty() {
            return;
        }
        for tag in tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.key_tags.insert(key.to_string(), tags.to_vec());
    }

    /// Remove a key from every tier; idempotent.
    ///
    /// Returns true if any tier actually held the key.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.invalidate_with_reason(key, InvalidationReason::Explicit)
            .await
    }

    /// Remove a key from every tier, emitting the given reason
    pub(crate) async fn invalidate_with_reason(
        &self,
        key: &str,
        reason: InvalidationReason,
    ) -> bool {
        // A pending timer for this key is superseded
        if let Some((_, handle)) = self.timers.remove(key) {
            handle.abort();
        }

        let mut removed_anywhere = false;
        for tier in &self.tiers {
            if tier.invalidate(key) {
                removed_anywhere = true;
            }
        }
        self.unregister(key);

        if removed_anywhere {
            debug!(key = %key, "invalidated");
            self.publish(CacheEvent::entry_invalidated(key, reason)).await;
        }
        removed_anywhere
    }

    /// Invalidate every key carrying `tag`; returns how many keys were
    /// removed from at least one tier
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys = match self.tag_index.remove(tag) {
            Some((_, keys)) => keys,
            None => return 0,
        };

        let mut removed = 0;
        for key in &keys {
            if self
                .invalidate_with_reason(key, InvalidationReason::Tag { tag: tag.to_string() })
                .await
            {
                removed += 1;
            }
        }

        self.publish(CacheEvent::TagInvalidated {
            tag: tag.to_string(),
            keys_removed: removed,
            timestamp: chrono::Utc::now(),
        })
        .await;
        removed
    }

    /// Invalidate every known key matching `pattern` (a regex).
    ///
    /// Scans the whole key registry: O(number of known keys). Deliberately
    /// expensive, not for hot paths.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let matches: Vec<String> = self
            .keys
            .iter()
            .filter(|key| regex.is_match(key.key()))
            .map(|key| key.key().clone())
            .collect();

        let mut removed = 0;
        for key in &matches {
            if self
                .invalidate_with_reason(
                    key,
                    InvalidationReason::Pattern {
                        pattern: pattern.to_string(),
                    },
                )
                .await
            {
                removed += 1;
            }
        }

        self.publish(CacheEvent::PatternInvalidated {
            pattern: pattern.to_string(),
            keys_removed: removed,
            timestamp: chrono::Utc::now(),
        })
        .await;
        Ok(removed)
    }

    /// Schedule `key` for invalidation after `delay`.
    ///
    /// Rescheduling the same key cancels the prior timer (last writer wins).
    /// A no-op after shutdown.
    pub fn schedule_invalidation(self: &Arc<Self>, key: &str, delay: Duration) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let manager = Arc::clone(self);
        let owned_key = key.to_string();
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Deregister first: invalidate aborts any timer it finds
                    // for the key, which here would be this very task
                    manager.timers.remove(&owned_key);
                    manager
                        .invalidate_with_reason(&owned_key, InvalidationReason::Scheduled)
                        .await;
                }
            }
        });

        if let Some(prior) = self.timers.insert(key.to_string(), handle) {
            prior.abort();
        }
    }

    /// Drop registry entries for keys no tier holds anymore.
    ///
    /// Tiers evict without notifying the registry, so tag/pattern indexes
    /// accumulate stale keys over time; this compacts them.
    pub fn prune(&self) -> usize {
        let stale: Vec<String> = self
            .keys
            .iter()
            .filter(|key| !self.tiers.iter().any(|t| t.contains(key.key())))
            .map(|key| key.key().clone())
            .collect();
        for key in &stale {
            self.unregister(key);
        }
        stale.len()
    }

    /// Number of keys currently registered
    pub fn known_keys(&self) -> usize {
        self.keys.len()
    }

    /// Number of tags currently indexed
    pub fn known_tags(&self) -> usize {
        self.tag_index.len()
    }

    /// Cancel pending timers and refuse further scheduling
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for entry in self.timers.iter() {
            entry.value().abort();
        }
        self.timers.clear();
    }

    fn unregister(&self, key: &str) {
        self.keys.remove(key);

        if let Some((_, tags)) = self.key_tags.remove(key) {
            for tag in tags {
                let emptied = match self.tag_index.get_mut(&tag) {
                    Some(mut keys) => {
                        keys.remove(key);
                        keys.is_empty()
                    }
                    None => false,
                };
                // Tag entries live only while at least one key carries them
                if emptied {
                    self.tag_index.remove_if(&tag, |_, keys| keys.is_empty());
                }
            }
        }
    }

    async fn publish(&self, event: CacheEvent) {
        // Observability must never fail the invalidation itself
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "failed to publish cache event");
        }
    }
}

impl std::fmt::Debug for InvalidationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationManager")
            .field("tiers", &self.tiers.len())
            .field("known_keys", &self.keys.len())
            .field("known_tags", &self.tag_index.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use crate::entry::CacheEntry;
    use crate::events::LoggingEventPublisher;
    use crate::policy::PolicyKind;
    use bytes::Bytes;

    fn tiers() -> Vec<Arc<CacheTier>> {
        vec![
            Arc::new(CacheTier::new(
                &TierConfig::new("l1", 16).with_policy(PolicyKind::Lru),
            )),
            Arc::new(CacheTier::new(
                &TierConfig::new("l2", 16).with_policy(PolicyKind::Fifo),
            )),
        ]
    }

    fn manager(tiers: &[Arc<CacheTier>]) -> Arc<InvalidationManager> {
        Arc::new(InvalidationManager::new(
            tiers.to_vec(),
            Arc::new(LoggingEventPublisher::new()),
        ))
    }

    fn put_all(tiers: &[Arc<CacheTier>], key: &str) {
        for tier in tiers {
            tier.put(key.to_string(), CacheEntry::new(Bytes::from_static(b"v"), None))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_invalidate_removes_from_all_tiers() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        put_all(&tiers, "a");
        mgr.register("a", &[]);

        assert!(mgr.invalidate("a").await);
        for tier in &tiers {
            assert!(!tier.contains("a"));
        }
        assert_eq!(mgr.known_keys(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        put_all(&tiers, "a");
        mgr.register("a", &[]);

        assert!(mgr.invalidate("a").await);
        // Second call observes nothing to remove and reports so, no error
        assert!(!mgr.invalidate("a").await);
    }

    #[tokio::test]
    async fn test_invalidate_by_tag() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        for key in ["product:42", "product:43"] {
            put_all(&tiers, key);
            mgr.register(key, &["category:electronics".to_string()]);
        }
        put_all(&tiers, "product:99");
        mgr.register("product:99", &["category:garden".to_string()]);

        let removed = mgr.invalidate_by_tag("category:electronics").await;
        assert_eq!(removed, 2);

        assert!(!tiers[0].contains("product:42"));
        assert!(!tiers[0].contains("product:43"));
        assert!(tiers[0].contains("product:99"));

        // The tag entry is gone once no key references it
        assert_eq!(mgr.known_tags(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_unknown_tag_is_noop() {
        let tiers = tiers();
        let mgr = manager(&tiers);
        assert_eq!(mgr.invalidate_by_tag("ghost").await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        for key in ["user:1", "user:2", "session:9"] {
            put_all(&tiers, key);
            mgr.register(key, &[]);
        }

        let removed = mgr.invalidate_by_pattern("^user:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(tiers[0].contains("session:9"));
        assert!(!tiers[0].contains("user:1"));
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_an_error() {
        let tiers = tiers();
        let mgr = manager(&tiers);
        assert!(matches!(
            mgr.invalidate_by_pattern("user:[").await,
            Err(Error::Pattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_scheduled_invalidation_fires() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        put_all(&tiers, "a");
        mgr.register("a", &[]);

        mgr.schedule_invalidation("a", Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!tiers[0].contains("a"));
    }

    #[tokio::test]
    async fn test_reschedule_is_last_writer_wins() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        put_all(&tiers, "a");
        mgr.register("a", &[]);

        mgr.schedule_invalidation("a", Duration::from_millis(20));
        // Push the deadline out; the first timer must not fire
        mgr.schedule_invalidation("a", Duration::from_millis(200));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tiers[0].contains("a"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!tiers[0].contains("a"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_timers() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        put_all(&tiers, "a");
        mgr.register("a", &[]);
        mgr.schedule_invalidation("a", Duration::from_millis(30));
        mgr.shutdown();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tiers[0].contains("a"));

        // Scheduling after shutdown is a no-op
        mgr.schedule_invalidation("a", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(tiers[0].contains("a"));
    }

    #[tokio::test]
    async fn test_prune_drops_stale_registry_keys() {
        let tiers = tiers();
        let mgr = manager(&tiers);

        put_all(&tiers, "live");
        mgr.register("live", &["t".to_string()]);
        // Registered but never written to any tier (simulates eviction)
        mgr.register("stale", &["t".to_string()]);

        assert_eq!(mgr.prune(), 1);
        assert_eq!(mgr.known_keys(), 1);

        // The shared tag survives because "live" still carries it
        assert_eq!(mgr.known_tags(), 1);
    }
}
