//! Eviction Policies
//!
//! Pluggable replacement bookkeeping for a single cache tier. A policy
//! mirrors the tier's key set: the tier calls `on_insert`/`on_access`/
//! `on_remove` under its own lock, and asks `select_victim` for the next
//! eviction candidate when it is at capacity.
//!
//! Invariant: the policy's tracked key set always equals the tier's entry
//! set. Orphaned policy keys or untracked entries are bugs.
//!
//! Ties between equally ranked keys are broken by insertion order (oldest
//! first) so eviction is deterministic.

mod adaptive;
mod fifo;
mod lfu;
mod lru;
mod proptest;

use serde::{Deserialize, Serialize};

pub use adaptive::AdaptivePolicy;
pub use fifo::FifoPolicy;
pub use lfu::LfuPolicy;
pub use lru::LruPolicy;

/// Eviction strategy selector, chosen per tier at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Evict the least recently accessed key
    Lru,
    /// Evict the least frequently accessed key
    Lfu,
    /// Evict the oldest inserted key, ignoring accesses
    Fifo,
    /// Evict the key with the worst recency/frequency score
    Adaptive,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Lru => write!(f, "lru"),
            PolicyKind::Lfu => write!(f, "lfu"),
            PolicyKind::Fifo => write!(f, "fifo"),
            PolicyKind::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Replacement bookkeeping contract for one tier
///
/// All methods are called by the owning tier while it holds its entry-map
/// lock, so implementations need no internal synchronization.
pub trait EvictionPolicy: Send {
    /// Called after every successful get
    fn on_access(&mut self, key: &str);

    /// Called after every new key insertion
    fn on_insert(&mut self, key: &str);

    /// Called whenever a key leaves the tier (eviction or invalidation)
    fn on_remove(&mut self, key: &str);

    /// Deterministic eviction candidate, or `None` if nothing is tracked
    fn select_victim(&self) -> Option<String>;

    /// Number of keys currently tracked
    fn len(&self) -> usize;

    /// True if no keys are tracked
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The strategy this policy implements
    fn kind(&self) -> PolicyKind;
}

/// Construct the policy implementation for a configured strategy
pub fn build(kind: PolicyKind) -> Box<dyn EvictionPolicy> {
    match kind {
        PolicyKind::Lru => Box::new(LruPolicy::new()),
        PolicyKind::Lfu => Box::new(LfuPolicy::new()),
        PolicyKind::Fifo => Box::new(FifoPolicy::new()),
        PolicyKind::Adaptive => Box::new(AdaptivePolicy::new()),
    }
}

// =============================================================================
// Tests
// =============================================================================
