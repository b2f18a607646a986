//! Cache Integration Tests
//!
//! End-to-end flows through the public API: tiered lookup, loader-backed
//! misses, stampede protection, tag invalidation, and eviction behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;

use stratacache::{
    CacheConfig, CacheManager, Error, FnLoader, Loader, PolicyKind, TierConfig,
};

fn user_loader(calls: Arc<AtomicUsize>) -> Arc<dyn Loader> {
    Arc::new(FnLoader::new(move |key: String| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            match key.as_str() {
                "user:1" => Ok(Bytes::from_static(b"{\"name\":\"Alice\"}")),
                "user:2" => Ok(Bytes::from_static(b"{\"name\":\"Bob\"}")),
                "user:3" => Ok(Bytes::from_static(b"{\"name\":\"Carol\"}")),
                _ => Err(Error::Loader {
                    key,
                    reason: "unknown user".to_string(),
                }),
            }
        }
    }))
}

fn tiered_config() -> CacheConfig {
    CacheConfig::default().with_tiers(vec![
        TierConfig::new("l1", 64)
            .with_ttl(Duration::from_secs(5))
            .with_policy(PolicyKind::Lru),
        TierConfig::new("l2", 256)
            .with_ttl(Duration::from_secs(30))
            .with_policy(PolicyKind::Lru),
        TierConfig::new("l3", 1024)
            .with_ttl(Duration::from_secs(120))
            .with_policy(PolicyKind::Fifo),
    ])
}

// =============================================================================
// End-to-End Scenarios
// =============================================================================

#[tokio::test]
async fn test_put_then_immediate_get_is_a_fast_tier_hit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CacheManager::with_config(tiered_config(), user_loader(calls.clone())).unwrap();

    cache
        .put("user:1", Bytes::from_static(b"{\"name\":\"Alice\"}"))
        .await
        .unwrap();

    let value = cache.get("user:1").await.unwrap();
    assert_eq!(value.as_ref(), b"{\"name\":\"Alice\"}");

    // Served from the fastest tier, loader untouched
    let stats = cache.statistics();
    assert_eq!(stats.tier("l1").unwrap().hits, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_full_miss_loads_once_and_backfills_everywhere() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CacheManager::with_config(tiered_config(), user_loader(calls.clone())).unwrap();

    let value = cache.get("user:2").await.unwrap();
    assert_eq!(value.as_ref(), b"{\"name\":\"Bob\"}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for tier in cache.tiers() {
        assert!(tier.contains("user:2"), "missing in tier {}", tier.name());
    }

    // Second get never reaches the loader
    cache.get("user:2").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_simultaneous_misses_share_a_single_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(
        CacheManager::with_config(tiered_config(), user_loader(calls.clone())).unwrap(),
    );

    let mut join_set = JoinSet::new();
    for _ in 0..2 {
        let cache = cache.clone();
        join_set.spawn(async move { cache.get("user:3").await });
    }

    while let Some(result) = join_set.join_next().await {
        assert_eq!(result.unwrap().unwrap().as_ref(), b"{\"name\":\"Carol\"}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tag_invalidation_removes_every_tagged_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CacheManager::with_config(tiered_config(), user_loader(calls)).unwrap();

    cache
        .put_with_tags(
            "product:42",
            Bytes::from_static(b"tv"),
            vec!["category:electronics".to_string()],
        )
        .await
        .unwrap();
    cache
        .put_with_tags(
            "product:43",
            Bytes::from_static(b"radio"),
            vec!["category:electronics".to_string()],
        )
        .await
        .unwrap();

    let removed = cache.invalidate_by_tag("category:electronics").await;
    assert_eq!(removed, 2);

    assert!(cache.try_get("product:42").is_none());
    assert!(cache.try_get("product:43").is_none());
}

#[tokio::test]
async fn test_capacity_one_lru_keeps_only_the_newest_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CacheConfig::default().with_tiers(vec![TierConfig::new("tiny", 1)
        .with_ttl(Duration::from_secs(60))
        .with_policy(PolicyKind::Lru)]);
    let cache = CacheManager::with_config(config, user_loader(calls)).unwrap();

    cache.put("a", Bytes::from_static(b"1")).await.unwrap();
    cache.put("b", Bytes::from_static(b"2")).await.unwrap();

    assert!(cache.try_get("a").is_none());
    assert_eq!(cache.try_get("b").unwrap().as_ref(), b"2");
}

// =============================================================================
// Cross-Cutting Properties
// =============================================================================

#[tokio::test]
async fn test_loader_error_reaches_every_concurrent_waiter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(
        CacheManager::with_config(tiered_config(), user_loader(calls.clone())).unwrap(),
    );

    let mut join_set = JoinSet::new();
    for _ in 0..4 {
        let cache = cache.clone();
        join_set.spawn(async move { cache.get("user:404").await });
    }

    while let Some(result) = join_set.join_next().await {
        match result.unwrap() {
            Err(Error::Loader { reason, .. }) => assert_eq!(reason, "unknown user"),
            other => panic!("expected loader error, got {:?}", other),
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The failed flight is gone; a later call retries the backend
    assert!(cache.get("user:404").await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ttl_expiry_returns_absent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CacheConfig::default().with_tiers(vec![TierConfig::new("only", 16)
        .with_ttl(Duration::from_millis(100))
        .with_policy(PolicyKind::Lru)]);
    let cache = CacheManager::with_config(config, user_loader(calls)).unwrap();

    cache.put("k", Bytes::from_static(b"v")).await.unwrap();
    assert!(cache.try_get("k").is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.try_get("k").is_none());
}

#[tokio::test]
async fn test_fifo_tier_evicts_hot_keys_too() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CacheConfig::default().with_tiers(vec![TierConfig::new("fifo", 2)
        .with_ttl(Duration::from_secs(60))
        .with_policy(PolicyKind::Fifo)]);
    let cache = CacheManager::with_config(config, user_loader(calls)).unwrap();

    cache.put("a", Bytes::from_static(b"1")).await.unwrap();
    cache.put("b", Bytes::from_static(b"2")).await.unwrap();
    for _ in 0..5 {
        cache.try_get("a");
    }
    cache.put("c", Bytes::from_static(b"3")).await.unwrap();

    // FIFO ignores the accesses: a is oldest, a goes
    assert!(cache.try_get("a").is_none());
    assert!(cache.try_get("b").is_some());
    assert!(cache.try_get("c").is_some());
}

#[tokio::test]
async fn test_repeated_invalidation_is_harmless() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CacheManager::with_config(tiered_config(), user_loader(calls)).unwrap();

    cache.put("k", Bytes::from_static(b"v")).await.unwrap();
    assert!(cache.invalidate("k").await);
    assert!(!cache.invalidate("k").await);
    assert!(cache.try_get("k").is_none());
}

#[tokio::test]
async fn test_metrics_track_the_whole_flow() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CacheManager::with_config(tiered_config(), user_loader(calls)).unwrap();

    cache.get("user:1").await.unwrap(); // full miss + load
    cache.get("user:1").await.unwrap(); // l1 hit
    cache.invalidate("user:1").await;

    let stats = cache.statistics();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.tier("l1").unwrap().hits, 1);
    assert_eq!(stats.tier("l1").unwrap().misses, 1);
    assert_eq!(stats.invalidations, 1);
    assert!(stats.overall_hit_ratio > 0.0 && stats.overall_hit_ratio < 1.0);
}

#[tokio::test]
async fn test_shutdown_stops_the_engine() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = CacheManager::with_config(tiered_config(), user_loader(calls)).unwrap();

    cache.put("k", Bytes::from_static(b"v")).await.unwrap();
    cache.shutdown();

    assert!(matches!(cache.get("k").await, Err(Error::Shutdown)));
    assert!(matches!(
        cache.put("x", Bytes::from_static(b"v")).await,
        Err(Error::Shutdown)
    ));
}
