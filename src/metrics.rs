//! Cache Metrics Collection
//!
//! Per-tier hit/miss/error counters and read-latency tracking, plus
//! load-path counters. Recording is a read-only side effect of cache
//! operations: it is infallible by construction (plain atomics, bounds
//! checks swallowed), so the observability path can never fail a cache
//! call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for a single tier
#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    /// Exponential moving average of read latency, in microseconds
    read_latency_us: AtomicU64,
}

/// Cache metrics collector
#[derive(Debug)]
pub struct CacheMetrics {
    tier_names: Vec<String>,
    tiers: Vec<TierCounters>,

    // Load path
    loads: AtomicU64,
    load_failures: AtomicU64,
    load_timeouts: AtomicU64,
    /// Callers that awaited another caller's in-flight load
    flight_waits: AtomicU64,

    invalidations: AtomicU64,
}

impl CacheMetrics {
    /// Create a collector for the given tier names (fastest first)
    pub fn new(tier_names: Vec<String>) -> Self {
        let tiers = tier_names.iter().map(|_| TierCounters::default()).collect();
        Self {
            tier_names,
            tiers,
            loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            load_timeouts: AtomicU64::new(0),
            flight_waits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Record a hit at tier `index`
    pub fn record_hit(&self, index: usize) {
        if let Some(t) = self.tiers.get(index) {
            t.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a miss at tier `index`
    pub fn record_miss(&self, index: usize) {
        if let Some(t) = self.tiers.get(index) {
            t.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an operation error at tier `index`
    pub fn record_error(&self, index: usize) {
        if let Some(t) = self.tiers.get(index) {
            t.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a read latency sample at tier `index`
    pub fn record_read_latency(&self, index: usize, duration: Duration) {
        if let Some(t) = self.tiers.get(index) {
            update_latency_ema(&t.read_latency_us, duration);
        }
    }

    /// Record a completed loader invocation
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed loader invocation
    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timed-out loader invocation
    pub fn record_load_timeout(&self) {
        self.load_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a caller that piggybacked on an in-flight load
    pub fn record_flight_wait(&self) {
        self.flight_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one invalidated key
    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Overall hit ratio: hits anywhere over terminal lookups.
    ///
    /// Only the slowest tier's misses count as misses; a faster tier's
    /// miss that hits below is not a terminal miss.
    pub fn overall_hit_ratio(&self) -> f64 {
        let total_hits: u64 = self
            .tiers
            .iter()
            .map(|t| t.hits.load(Ordering::Relaxed))
            .sum();
        let terminal_misses = self
            .tiers
            .last()
            .map(|t| t.misses.load(Ordering::Relaxed))
            .unwrap_or(0);
        let total = total_hits + terminal_misses;
        if total == 0 {
            0.0
        } else {
            total_hits as f64 / total as f64
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tiers = self
            .tier_names
            .iter()
            .zip(&self.tiers)
            .map(|(name, t)| {
                let hits = t.hits.load(Ordering::Relaxed);
                let misses = t.misses.load(Ordering::Relaxed);
                let total = hits + misses;
                TierMetricsSnapshot {
                    name: name.clone(),
                    hits,
                    misses,
                    errors: t.errors.load(Ordering::Relaxed),
                    hit_ratio: if total == 0 {
                        0.0
                    } else {
                        hits as f64 / total as f64
                    },
                    avg_read_latency: Duration::from_micros(
                        t.read_latency_us.load(Ordering::Relaxed),
                    ),
                }
            })
            .collect();

        MetricsSnapshot {
            tiers,
            overall_hit_ratio: self.overall_hit_ratio(),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            load_timeouts: self.load_timeouts.load(Ordering::Relaxed),
            flight_waits: self.flight_waits.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for t in &self.tiers {
            t.hits.store(0, Ordering::Relaxed);
            t.misses.store(0, Ordering::Relaxed);
            t.errors.store(0, Ordering::Relaxed);
            t.read_latency_us.store(0, Ordering::Relaxed);
        }
        self.loads.store(0, Ordering::Relaxed);
        self.load_failures.store(0, Ordering::Relaxed);
        self.load_timeouts.store(0, Ordering::Relaxed);
        self.flight_waits.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

/// CAS-loop EMA update; smoothing keeps one sample from skewing the figure
fn update_latency_ema(target: &AtomicU64, duration: Duration) {
    let new_us = duration.as_micros() as u64;
    let alpha = 0.1;

    loop {
        let current = target.load(Ordering::Relaxed);
        let updated = if current == 0 {
            new_us
        } else {
            ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
        };

        if target
            .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

/// Point-in-time metrics for one tier
#[derive(Debug, Clone)]
pub struct TierMetricsSnapshot {
    /// Tier name
    pub name: String,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Operation error count
    pub errors: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Smoothed read latency
    pub avg_read_latency: Duration,
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Per-tier metrics, fastest first
    pub tiers: Vec<TierMetricsSnapshot>,
    /// Overall hit ratio across the hierarchy
    pub overall_hit_ratio: f64,
    /// Completed loader invocations
    pub loads: u64,
    /// Failed loader invocations
    pub load_failures: u64,
    /// Timed-out loader invocations
    pub load_timeouts: u64,
    /// Callers that awaited an existing in-flight load
    pub flight_waits: u64,
    /// Invalidated keys
    pub invalidations: u64,
}

impl MetricsSnapshot {
    /// Metrics for the named tier, if present
    pub fn tier(&self, name: &str) -> Option<&TierMetricsSnapshot> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> CacheMetrics {
        CacheMetrics::new(vec!["l1".to_string(), "l2".to_string()])
    }

    #[test]
    fn test_metrics_creation() {
        let m = metrics();
        let snap = m.snapshot();
        assert_eq!(snap.tiers.len(), 2);
        assert_eq!(snap.tiers[0].hits, 0);
        assert_eq!(snap.overall_hit_ratio, 0.0);
    }

    #[test]
    fn test_hit_miss_tracking() {
        let m = metrics();
        m.record_hit(0);
        m.record_hit(0);
        m.record_miss(0);

        let snap = m.snapshot();
        assert_eq!(snap.tiers[0].hits, 2);
        assert_eq!(snap.tiers[0].misses, 1);
        assert!((snap.tiers[0].hit_ratio - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_out_of_range_tier_is_swallowed() {
        let m = metrics();
        // Must never panic: the metrics path cannot fail cache operations
        m.record_hit(99);
        m.record_miss(99);
        m.record_read_latency(99, Duration::from_micros(1));
        assert_eq!(m.snapshot().tiers[0].hits, 0);
    }

    #[test]
    fn test_overall_hit_ratio_counts_terminal_misses_only() {
        let m = metrics();
        // Missed l1, hit l2: overall ratio should be 1.0
        m.record_miss(0);
        m.record_hit(1);
        assert!((m.overall_hit_ratio() - 1.0).abs() < f64::EPSILON);

        // One terminal miss brings it to 0.5
        m.record_miss(0);
        m.record_miss(1);
        assert!((m.overall_hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_ema_smooths() {
        let m = metrics();
        m.record_read_latency(0, Duration::from_micros(100));
        assert_eq!(
            m.snapshot().tiers[0].avg_read_latency,
            Duration::from_micros(100)
        );

        m.record_read_latency(0, Duration::from_micros(200));
        let latency = m.snapshot().tiers[0].avg_read_latency.as_micros();
        assert!(latency > 100 && latency < 200);
    }

    #[test]
    fn test_load_counters() {
        let m = metrics();
        m.record_load();
        m.record_load_failure();
        m.record_load_timeout();
        m.record_flight_wait();
        m.record_invalidation();

        let snap = m.snapshot();
        assert_eq!(snap.loads, 1);
        assert_eq!(snap.load_failures, 1);
        assert_eq!(snap.load_timeouts, 1);
        assert_eq!(snap.flight_waits, 1);
        assert_eq!(snap.invalidations, 1);
    }

    #[test]
    fn test_snapshot_tier_lookup_by_name() {
        let m = metrics();
        m.record_hit(1);
        let snap = m.snapshot();
        assert_eq!(snap.tier("l2").unwrap().hits, 1);
        assert!(snap.tier("nope").is_none());
    }

    #[test]
    fn test_reset() {
        let m = metrics();
        m.record_hit(0);
        m.record_load();
        m.reset();

        let snap = m.snapshot();
        assert_eq!(snap.tiers[0].hits, 0);
        assert_eq!(snap.loads, 0);
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(tracker.elapsed() >= Duration::from_millis(5));
    }
}
