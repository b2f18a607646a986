//! Error types for StrataCache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine
///
/// All variants are cloneable so that a single load failure can be
/// propagated to every waiter of a deduplicated load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The external data loader failed; never cached unless negative
    /// caching is enabled
    #[error("loader failed for key '{key}': {reason}")]
    Loader { key: String, reason: String },

    /// The external data loader exceeded the configured timeout
    #[error("loader timed out for key '{key}' after {timeout_ms}ms")]
    LoaderTimeout { key: String, timeout_ms: u64 },

    /// An eviction policy failed to free space when required. This is an
    /// invariant violation, not a normal runtime condition.
    #[error(
        "capacity invariant violated in tier '{tier}': no eviction candidate at {len}/{capacity} entries"
    )]
    CapacityViolation {
        tier: String,
        len: usize,
        capacity: usize,
    },

    /// A tier failed to remove a key during invalidation fan-out
    #[error("invalidation failed in tier '{tier}' for key '{key}': {reason}")]
    Invalidation {
        tier: String,
        key: String,
        reason: String,
    },

    /// Invalid invalidation pattern
    #[error("invalid invalidation pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation attempted after manager shutdown
    #[error("cache manager is shut down")]
    Shutdown,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short classification tag used in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Loader { .. } => "loader",
            Error::LoaderTimeout { .. } => "loader_timeout",
            Error::CapacityViolation { .. } => "capacity_violation",
            Error::Invalidation { .. } => "invalidation",
            Error::Pattern { .. } => "pattern",
            Error::Config(_) => "config",
            Error::Shutdown => "shutdown",
            Error::Internal(_) => "internal",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Loader {
            key: "user:1".to_string(),
            reason: "backend unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "loader failed for key 'user:1': backend unavailable"
        );
    }

    #[test]
    fn test_error_clone_preserves_contents() {
        let err = Error::LoaderTimeout {
            key: "k".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::Shutdown.kind(), "shutdown");
        assert_eq!(
            Error::CapacityViolation {
                tier: "l1".to_string(),
                len: 3,
                capacity: 2,
            }
            .kind(),
            "capacity_violation"
        );
    }
}
