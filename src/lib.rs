//! StrataCache - Multi-Level Caching Engine
//!
//! A tiered cache manager with pluggable eviction, single-flight stampede
//! protection, and event-driven invalidation. Lookups walk the hierarchy
//! fastest-to-slowest, back-fill faster tiers on a hit, and deduplicate
//! loader calls on a full miss so the backend sees one request per key no
//! matter how many callers miss at once.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         Cache Manager                             │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  Tier 0 (fastest)   │  Tier 1            │  Tier N (slowest)      │
//! │  ┌───────────────┐  │  ┌──────────────┐  │  ┌──────────────────┐  │
//! │  │ bounded map   │  │  │ bounded map  │  │  │ bounded map      │  │
//! │  │ + policy      │  │  │ + policy     │  │  │ + policy         │  │
//! │  └───────────────┘  │  └──────────────┘  │  └──────────────────┘  │
//! │          │  back-fill ◀─────┴── back-fill ◀──────┘                │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  Stampede Guard (single-flight)   │   Invalidation Manager        │
//! │  key -> shared in-flight load     │   key / tag / pattern fan-out │
//! └───────────────┬───────────────────────────────┬───────────────────┘
//!                 ▼                               ▲
//!          Loader (consumed port)        ChangeEventSource (consumed)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use stratacache::{CacheManager, FnLoader};
//!
//! let loader = Arc::new(FnLoader::new(|key: String| async move {
//!     Ok(Bytes::from(format!("value for {key}")))
//! }));
//! let cache = CacheManager::new(loader)?;
//!
//! let value = cache.get("user:1").await?;
//! cache.invalidate("user:1").await;
//! ```
//!
//! # Modules
//!
//! - [`config`] - Per-tier and global configuration
//! - [`entry`] - Cache entry and access metadata
//! - [`error`] - Error types
//! - [`events`] - Cache events and the publisher/change-source ports
//! - [`invalidation`] - Key/tag/pattern invalidation fan-out
//! - [`loader`] - The consumed load-by-key port
//! - [`manager`] - The unified multi-level cache manager
//! - [`metrics`] - Hit/miss/latency collection
//! - [`policy`] - Pluggable eviction strategies
//! - [`stampede`] - Single-flight load deduplication
//! - [`tier`] - One bounded cache level

pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod loader;
pub mod manager;
pub mod metrics;
pub mod policy;
pub mod stampede;
pub mod tier;

// Re-export commonly used types
pub use config::{CacheConfig, TierConfig, DEFAULT_LOADER_TIMEOUT, DEFAULT_NEGATIVE_TTL};
pub use entry::CacheEntry;
pub use error::{Error, Result};
pub use events::{
    CacheEvent, ChangeEvent, ChangeEventSource, EventPublisher, InvalidationReason,
    LoggingEventPublisher,
};
pub use loader::{FnLoader, Loader};
pub use manager::CacheManager;
pub use metrics::{MetricsSnapshot, TierMetricsSnapshot};
pub use policy::{EvictionPolicy, PolicyKind};
pub use tier::{CacheTier, TierStats};

// =============================================================================
// Tests
// =============================================================================
