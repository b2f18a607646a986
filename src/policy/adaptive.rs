//! Adaptive Eviction Policy
//!
//! Weighs recency against frequency: each key is scored as
//! `age_since_last_access / (access_count + 1)` and the highest score is
//! evicted. Hot keys survive longer the more often they are read; an idle
//! key's score grows linearly with time.

use std::collections::HashMap;

use crate::entry::epoch_millis;

use super::{EvictionPolicy, PolicyKind};

#[derive(Debug, Clone, Copy)]
struct KeyState {
    last_access_ms: u64,
    access_count: u32,
    inserted_at: u64,
}

impl KeyState {
    fn score(&self, now_ms: u64) -> f64 {
        let age = now_ms.saturating_sub(self.last_access_ms) as f64;
        age / (self.access_count as f64 + 1.0)
    }
}

/// Recency/frequency scored replacement bookkeeping
#[derive(Debug, Default)]
pub struct AdaptivePolicy {
    keys: HashMap<String, KeyState>,
    /// Monotonic insertion sequence, used for deterministic tie-breaks
    clock: u64,
}

impl AdaptivePolicy {
    /// Create an empty adaptive policy
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for AdaptivePolicy {
    fn on_access(&mut self, key: &str) {
        let now = epoch_millis();
        if let Some(state) = self.keys.get_mut(key) {
            state.last_access_ms = now;
            state.access_count = state.access_count.saturating_add(1);
        }
    }

    fn on_insert(&mut self, key: &str) {
        self.clock += 1;
        self.keys.insert(
            key.to_string(),
            KeyState {
                last_access_ms: epoch_millis(),
                access_count: 1,
                inserted_at: self.clock,
            },
        );
    }

    fn on_remove(&mut self, key: &str) {
        self.keys.remove(key);
    }

    fn select_victim(&self) -> Option<String> {
        let now = epoch_millis();
        self.keys
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.score(now)
                    .partial_cmp(&b.score(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Equal scores: evict the older insertion first
                    .then(b.inserted_at.cmp(&a.inserted_at))
            })
            .map(|(key, _)| key.clone())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Adaptive
    }
}

// =============================================================================
// Tests
// =============================================================================
