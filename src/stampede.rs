//! Stampede Guard
//!
//! Deduplicates concurrent loads of the same missing key so the backend
//! sees one request while every caller gets the result ("single-flight").
//!
//! # Design
//!
//! - Registry of key -> shared load future; check-and-install is atomic
//!   through the concurrent map's entry API, so two callers can never both
//!   believe they are the sole loader
//! - All waiters poll one `Shared` future; success and failure propagate
//!   identically to every waiter
//! - The registry entry is removed when the flight completes, so a later
//!   request after a failure retries fresh (no negative caching here)
//! - An optional semaphore caps concurrent distinct loads; the configured
//!   loader timeout covers both the semaphore wait and the load itself

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::loader::Loader;

type LoadFuture = Shared<Pin<Box<dyn Future<Output = Result<Bytes>> + Send>>>;

/// Removes the in-flight registry entry when the owning flight ends.
///
/// Tied to the flight leader so the key is released even if the leader's
/// task is cancelled mid-load; waiters keep their clone of the shared
/// future either way.
struct FlightGuard<'a> {
    registry: &'a DashMap<String, LoadFuture>,
    key: &'a str,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.key);
    }
}

/// Outcome of a guarded load
pub struct FlightOutcome {
    /// The load result shared by every waiter
    pub result: Result<Bytes>,
    /// True for the caller that installed the flight
    pub was_leader: bool,
}

/// Single-flight load registry
pub struct StampedeGuard {
    in_flight: DashMap<String, LoadFuture>,
    load_permits: Option<Arc<Semaphore>>,
    loader_timeout: Duration,
}

impl StampedeGuard {
    /// Create a guard with the given loader timeout and optional cap on
    /// concurrent distinct loads
    pub fn new(loader_timeout: Duration, max_concurrent_loads: Option<usize>) -> Self {
        Self {
            in_flight: DashMap::new(),
            load_permits: max_concurrent_loads.map(|n| Arc::new(Semaphore::new(n))),
            loader_timeout,
        }
    }

    /// Load `key` through `loader`, deduplicating against any in-flight
    /// load of the same key.
    ///
    /// At most one loader invocation runs per key at any time; every
    /// concurrent caller receives the same result or the same error.
    pub async fn load(&self, key: &str, loader: Arc<dyn Loader>) -> FlightOutcome {
        let (flight, was_leader) = match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                debug!(key = %key, "joining in-flight load");
                (existing.get().clone(), false)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let flight = Self::make_flight(
                    key.to_string(),
                    loader,
                    self.load_permits.clone(),
                    self.loader_timeout,
                );
                slot.insert(flight.clone());
                (flight, true)
            }
        };

        if was_leader {
            let _cleanup = FlightGuard {
                registry: &self.in_flight,
                key,
            };
            let result = flight.await;
            FlightOutcome {
                result,
                was_leader: true,
            }
        } else {
            FlightOutcome {
                result: flight.await,
                was_leader: false,
            }
        }
    }

    fn make_flight(
        key: String,
        loader: Arc<dyn Loader>,
        permits: Option<Arc<Semaphore>>,
        timeout: Duration,
    ) -> LoadFuture {
        let fut: Pin<Box<dyn Future<Output = Result<Bytes>> + Send>> = Box::pin(async move {
            let timeout_key = key.clone();
            let bounded = async move {
                let _permit = match permits {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| Error::Internal(format!("load semaphore closed: {e}")))?,
                    ),
                    None => None,
                };
                loader.load(&key).await
            };

            match tokio::time::timeout(timeout, bounded).await {
                Ok(result) => result,
                Err(_) => Err(Error::LoaderTimeout {
                    key: timeout_key,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        });
        fut.shared()
    }

    /// Number of loads currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl std::fmt::Debug for StampedeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampedeGuard")
            .field("in_flight", &self.in_flight.len())
            .field("loader_timeout", &self.loader_timeout)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
