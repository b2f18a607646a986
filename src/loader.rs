//! Data Loader Port
//!
//! The cache consumes an external load-by-key capability on full misses.
//! Implementations are supplied by the embedding application (typically a
//! database-backed repository); the cache never knows where values come
//! from.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Load-by-key capability consumed on cache misses
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load the value for a key. May fail, may be slow; the cache applies
    /// its own timeout around each invocation.
    async fn load(&self, key: &str) -> Result<Bytes>;

    /// Load several keys at once, for bulk warming.
    ///
    /// The default implementation loads sequentially; backends with a
    /// native batch operation should override it.
    async fn load_batch(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            out.insert(key.clone(), self.load(key).await?);
        }
        Ok(out)
    }
}

/// Adapter turning an async closure into a [`Loader`]
///
/// Mostly useful in tests and small call sites:
///
/// ```ignore
/// let loader = FnLoader::new(|key: String| async move {
///     Ok(Bytes::from(format!("value-for-{key}")))
/// });
/// ```
pub struct FnLoader<F> {
    f: F,
}

impl<F> FnLoader<F> {
    /// Wrap a `Fn(String) -> Future<Output = Result<Bytes>>`
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Loader for FnLoader<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes>> + Send,
{
    async fn load(&self, key: &str) -> Result<Bytes> {
        (self.f)(key.to_string()).await
    }
}

// =============================================================================
// Tests
// =============================================================================
