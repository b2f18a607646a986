//! Cache Events
//!
//! Immutable records of significant cache occurrences, plus the ports for
//! publishing them and for consuming external change notifications.
//!
//! Outbound events are used for:
//! - Audit logging
//! - Cache warming triggers in consumers
//! - Decoupling observers from the cache engine
//!
//! Inbound [`ChangeEvent`]s come from whatever persistence layer the
//! application uses and drive invalidation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Why a key was invalidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidationReason {
    /// Explicit per-key invalidation
    Explicit,
    /// Removed as part of a tag fan-out
    Tag { tag: String },
    /// Removed as part of a pattern sweep
    Pattern { pattern: String },
    /// A scheduled invalidation timer fired
    Scheduled,
    /// Driven by an external change notification
    ChangeNotification,
}

/// Cache event representing a significant occurrence in the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    /// A key was removed from the hierarchy
    EntryInvalidated {
        key: String,
        #[serde(flatten)]
        reason: InvalidationReason,
        timestamp: DateTime<Utc>,
    },

    /// A tag fan-out completed
    TagInvalidated {
        tag: String,
        keys_removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A pattern sweep completed
    PatternInvalidated {
        pattern: String,
        keys_removed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Build an `EntryInvalidated` event stamped now
    pub fn entry_invalidated(key: impl Into<String>, reason: InvalidationReason) -> Self {
        Self::EntryInvalidated {
            key: key.into(),
            reason,
            timestamp: Utc::now(),
        }
    }

    /// Event type name, for logging and routing
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::EntryInvalidated { .. } => "entry_invalidated",
            CacheEvent::TagInvalidated { .. } => "tag_invalidated",
            CacheEvent::PatternInvalidated { .. } => "pattern_invalidated",
        }
    }
}

/// Outbound event port
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event
    async fn publish(&self, event: CacheEvent) -> Result<()>;

    /// Publish a batch of events
    async fn publish_all(&self, events: Vec<CacheEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Logging-based event publisher.
///
/// Publishes cache events to the tracing/logging system. Useful for
/// development, debugging, and audit trails.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    /// Create a new logging event publisher (debug level)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that logs at info level
    pub fn info_level() -> Self {
        Self { info_level: true }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        let event_type = event.event_type();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        if self.info_level {
            info!(event_type = %event_type, event = %json, "Cache event");
        } else {
            debug!(event_type = %event_type, event = %json, "Cache event");
        }

        Ok(())
    }
}

/// External mutation notification carrying an affected key or tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    /// An entity backing a cache key was updated
    EntityUpdated { key: String },
    /// An entity backing a cache key was deleted
    EntityDeleted { key: String },
    /// Everything under a tag changed
    TagChanged { tag: String },
}

/// Inbound change-notification port.
///
/// Supplied by the persistence layer; the cache subscribes and fans the
/// resulting invalidations out across all tiers.
#[async_trait]
pub trait ChangeEventSource: Send {
    /// Next change notification, or `None` when the source is exhausted
    async fn next_event(&mut self) -> Option<ChangeEvent>;
}

/// Any mpsc receiver of change events is a usable source
#[async_trait]
impl ChangeEventSource for tokio::sync::mpsc::Receiver<ChangeEvent> {
    async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.recv().await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = CacheEvent::entry_invalidated("k", InvalidationReason::Explicit);
        assert_eq!(event.event_type(), "entry_invalidated");
    }

    #[test]
    fn test_event_serialization() {
        let event = CacheEvent::entry_invalidated(
            "product:42",
            InvalidationReason::Tag {
                tag: "category:electronics".to_string(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"EntryInvalidated\""));
        assert!(json.contains("product:42"));
        assert!(json.contains("category:electronics"));
    }

    #[test]
    fn test_change_event_roundtrip() {
        let event = ChangeEvent::EntityDeleted {
            key: "user:1".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        match back {
            ChangeEvent::EntityDeleted { key } => assert_eq!(key, "user:1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_logging_publisher_never_fails() {
        let publisher = LoggingEventPublisher::info_level();
        let events = vec![
            CacheEvent::entry_invalidated("a", InvalidationReason::Explicit),
            CacheEvent::entry_invalidated("b", InvalidationReason::Scheduled),
        ];
        assert!(publisher.publish_all(events).await.is_ok());
    }

    #[tokio::test]
    async fn test_mpsc_receiver_as_change_source() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        tx.send(ChangeEvent::TagChanged {
            tag: "t".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        assert!(matches!(
            rx.next_event().await,
            Some(ChangeEvent::TagChanged { .. })
        ));
        assert!(rx.next_event().await.is_none());
    }
}
