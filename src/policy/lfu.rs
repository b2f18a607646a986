//! LFU Eviction Policy
//!
//! Tracks an access frequency per key; the victim is any key with the
//! lowest frequency, ties broken by insertion order (oldest first).

use std::collections::HashMap;

use super::{EvictionPolicy, PolicyKind};

#[derive(Debug, Clone, Copy)]
struct KeyState {
    frequency: u32,
    inserted_at: u64,
}

/// Least-frequently-used replacement bookkeeping
#[derive(Debug, Default)]
pub struct LfuPolicy {
    keys: HashMap<String, KeyState>,
    /// Monotonic insertion sequence, used for deterministic tie-breaks
    clock: u64,
}

impl LfuPolicy {
    /// Create an empty LFU policy
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn frequency(&self, key: &str) -> Option<u32> {
        self.keys.get(key).map(|s| s.frequency)
    }
}

impl EvictionPolicy for LfuPolicy {
    fn on_access(&mut self, key: &str) {
        if let Some(state) = self.keys.get_mut(key) {
            state.frequency = state.frequency.saturating_add(1);
        }
    }

    fn on_insert(&mut self, key: &str) {
        self.clock += 1;
        self.keys.insert(
            key.to_string(),
            KeyState {
                frequency: 1,
                inserted_at: self.clock,
            },
        );
    }

    fn on_remove(&mut self, key: &str) {
        self.keys.remove(key);
    }

    fn select_victim(&self) -> Option<String> {
        self.keys
            .iter()
            .min_by_key(|(_, state)| (state.frequency, state.inserted_at))
            .map(|(key, _)| key.clone())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Lfu
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfu_victim_is_least_frequent() {
        let mut policy = LfuPolicy::new();
        policy.on_insert("a");
        policy.on_insert("b");
        policy.on_access("a");
        policy.on_access("a");
        policy.on_access("b");

        assert_eq!(policy.frequency("a"), Some(3));
        assert_eq!(policy.frequency("b"), Some(2));
        assert_eq!(policy.select_victim(), Some("b".to_string()));
    }

    #[test]
    fn test_lfu_tie_broken_by_insertion_order() {
        let mut policy = LfuPolicy::new();
        policy.on_insert("first");
        policy.on_insert("second");
        policy.on_insert("third");

        // All at frequency 1: oldest inserted wins the tie
        assert_eq!(policy.select_victim(), Some("first".to_string()));

        policy.on_access("first");
        assert_eq!(policy.select_victim(), Some("second".to_string()));
    }

    #[test]
    fn test_lfu_reinsert_resets_frequency() {
        let mut policy = LfuPolicy::new();
        policy.on_insert("a");
        policy.on_access("a");
        policy.on_access("a");
        policy.on_remove("a");
        policy.on_insert("a");

        assert_eq!(policy.frequency("a"), Some(1));
    }

    #[test]
    fn test_lfu_remove_cleans_bookkeeping() {
        let mut policy = LfuPolicy::new();
        policy.on_insert("a");
        policy.on_remove("a");
        assert!(policy.is_empty());
        assert_eq!(policy.select_victim(), None);
    }
}
