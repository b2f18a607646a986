//! Cache Configuration
//!
//! Per-tier and global settings. Tiers are listed fastest first; the
//! shipped defaults follow the convention that TTLs never decrease from
//! fast to slow tiers, so faster tiers refresh more often.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::PolicyKind;

/// Default loader timeout
pub const DEFAULT_LOADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default TTL for negative-cached load failures
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(1);

/// Configuration for a single cache tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier name, used in logs, errors, and metrics
    pub name: String,
    /// Maximum number of entries; fixed at construction
    pub capacity: usize,
    /// Default TTL for entries written to this tier (`None` = no expiry)
    pub ttl: Option<Duration>,
    /// Eviction strategy
    pub policy: PolicyKind,
}

impl TierConfig {
    /// Create a tier config with the given name and capacity
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            ttl: None,
            policy: PolicyKind::Lru,
        }
    }

    /// Set the default TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the eviction strategy
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }
}

/// Cache engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tiers in lookup order, fastest first
    pub tiers: Vec<TierConfig>,
    /// Cap on concurrent distinct in-flight loads (`None` = unbounded)
    pub max_concurrent_loads: Option<usize>,
    /// Timeout applied to each loader invocation
    pub loader_timeout: Duration,
    /// Cache load failures briefly instead of retrying on every miss
    pub negative_caching: bool,
    /// How long a negative-cached failure is held (fastest tier only)
    pub negative_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierConfig::new("l1", 4_096)
                    .with_ttl(Duration::from_secs(60))
                    .with_policy(PolicyKind::Adaptive),
                TierConfig::new("l2", 16_384)
                    .with_ttl(Duration::from_secs(300))
                    .with_policy(PolicyKind::Lru),
                TierConfig::new("l3", 65_536)
                    .with_ttl(Duration::from_secs(1_800))
                    .with_policy(PolicyKind::Fifo),
            ],
            max_concurrent_loads: Some(64),
            loader_timeout: DEFAULT_LOADER_TIMEOUT,
            negative_caching: false,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
        }
    }
}

impl CacheConfig {
    /// Single-tier configuration, mostly useful for tests and small caches
    pub fn single_tier(capacity: usize, ttl: Duration, policy: PolicyKind) -> Self {
        Self {
            tiers: vec![TierConfig::new("l1", capacity)
                .with_ttl(ttl)
                .with_policy(policy)],
            ..Self::default()
        }
    }

    /// Replace the tier list (fastest first)
    pub fn with_tiers(mut self, tiers: Vec<TierConfig>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Set the loader timeout
    pub fn with_loader_timeout(mut self, timeout: Duration) -> Self {
        self.loader_timeout = timeout;
        self
    }

    /// Enable negative caching with the given hold time
    pub fn with_negative_caching(mut self, ttl: Duration) -> Self {
        self.negative_caching = true;
        self.negative_ttl = ttl;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(Error::Config("at least one tier is required".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for tier in &self.tiers {
            if tier.name.is_empty() {
                return Err(Error::Config("tier name must not be empty".to_string()));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(Error::Config(format!("duplicate tier name '{}'", tier.name)));
            }
            if tier.capacity == 0 {
                return Err(Error::Config(format!(
                    "tier '{}' capacity must be at least 1",
                    tier.name
                )));
            }
            if matches!(tier.ttl, Some(t) if t.is_zero()) {
                return Err(Error::Config(format!(
                    "tier '{}' TTL must be positive",
                    tier.name
                )));
            }
        }

        if self.max_concurrent_loads == Some(0) {
            return Err(Error::Config(
                "max_concurrent_loads must be at least 1".to_string(),
            ));
        }
        if self.loader_timeout.is_zero() {
            return Err(Error::Config("loader_timeout must be positive".to_string()));
        }
        if self.negative_caching && self.negative_ttl.is_zero() {
            return Err(Error::Config("negative_ttl must be positive".to_string()));
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiers.len(), 3);
        assert_eq!(config.tiers[0].name, "l1");
    }

    #[test]
    fn test_default_ttls_do_not_decrease_toward_slow_tiers() {
        let config = CacheConfig::default();
        let ttls: Vec<Duration> = config.tiers.iter().map(|t| t.ttl.unwrap()).collect();
        assert!(ttls.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_single_tier_config() {
        let config = CacheConfig::single_tier(10, Duration::from_secs(1), PolicyKind::Fifo);
        assert!(config.validate().is_ok());
        assert_eq!(config.tiers.len(), 1);
        assert_eq!(config.tiers[0].capacity, 10);
        assert_eq!(config.tiers[0].policy, PolicyKind::Fifo);
    }

    #[test]
    fn test_validate_rejects_empty_tiers() {
        let config = CacheConfig::default().with_tiers(vec![]);
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = CacheConfig::default().with_tiers(vec![TierConfig::new("l1", 0)]);
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let config = CacheConfig::default()
            .with_tiers(vec![TierConfig::new("t", 1), TierConfig::new("t", 2)]);
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = CacheConfig::default();
        config.max_concurrent_loads = Some(0);
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = CacheConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tiers.len(), config.tiers.len());
        assert_eq!(back.loader_timeout, config.loader_timeout);
    }
}
