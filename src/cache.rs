//! Cache capability — an external collaborator queried before dispatch and
//! populated after a successful response.
//!
//! The core only calls `lookup(fingerprint)` and `store(fingerprint,
//! response)`; storage internals (disk layout, eviction) belong to the
//! implementation. The [`InMemoryCache`] is provided for development and
//! testing; production callers can implement [`CacheProvider`] over their
//! own storage engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Fingerprint;
use crate::error::Result;
use crate::types::RawResponse;

/// A cached response together with its freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The response as delivered by the gateway.
    pub response: RawResponse,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
}

/// Capability interface for response caching, keyed by configuration
/// fingerprint.
///
/// Implementations must be safe for concurrent invocation from multiple
/// tasks; the core does not serialize access to them.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Look up a cached response for the given fingerprint.
    ///
    /// Returns `None` on a miss (including expired entries).
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RawResponse>>;

    /// Store a response under the given fingerprint, overwriting any
    /// previous entry.
    async fn store(&self, fingerprint: &Fingerprint, response: &RawResponse) -> Result<()>;
}

/// In-memory cache backed by a `HashMap` with an optional time-to-live.
///
/// All entries are lost when the process exits.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<Fingerprint, CacheEntry>>>,
    ttl: Option<Duration>,
}

impl InMemoryCache {
    /// Create a cache whose entries never expire.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: None,
        }
    }

    /// Create a cache whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Some(ttl),
        }
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next lookup).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(entry.stored_at);
                age.to_std().map(|age| age <= ttl).unwrap_or(true)
            }
            None => true,
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RawResponse>> {
        let entries = self.entries.read().await;
        match entries.get(fingerprint) {
            Some(entry) if self.is_fresh(entry) => {
                debug!(fingerprint = %fingerprint, "cache hit");
                Ok(Some(entry.response.clone()))
            }
            Some(_) => {
                debug!(fingerprint = %fingerprint, "cache entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn store(&self, fingerprint: &Fingerprint, response: &RawResponse) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            *fingerprint,
            CacheEntry {
                response: response.clone(),
                stored_at: Utc::now(),
            },
        );
        debug!(fingerprint = %fingerprint, "cache entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, GlobalConfig};
    use crate::types::{HttpMethod, RequestDescriptor};
    use serde_json::json;

    fn fingerprint_for(target: &str) -> Fingerprint {
        let global = GlobalConfig::new().with_base_url("https://api.example.com");
        let desc = RequestDescriptor::new(HttpMethod::Get, target);
        Fingerprint::derive(&resolve(&global, &desc).unwrap())
    }

    #[tokio::test]
    async fn lookup_miss_then_hit() {
        let cache = InMemoryCache::new();
        let fp = fingerprint_for("/v1/item");
        assert!(cache.lookup(&fp).await.unwrap().is_none());

        let response = RawResponse::success(json!({"id": 7}));
        cache.store(&fp, &response).await.unwrap();

        let hit = cache.lookup(&fp).await.unwrap().unwrap();
        assert_eq!(hit.data_object, Some(json!({"id": 7})));
    }

    #[tokio::test]
    async fn store_overwrites_previous_entry() {
        let cache = InMemoryCache::new();
        let fp = fingerprint_for("/v1/item");
        cache
            .store(&fp, &RawResponse::success(json!({"v": 1})))
            .await
            .unwrap();
        cache
            .store(&fp, &RawResponse::success(json!({"v": 2})))
            .await
            .unwrap();

        assert_eq!(cache.len().await, 1);
        let hit = cache.lookup(&fp).await.unwrap().unwrap();
        assert_eq!(hit.data_object, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let cache = InMemoryCache::with_ttl(Duration::from_millis(10));
        let fp = fingerprint_for("/v1/item");
        cache
            .store(&fp, &RawResponse::success(json!({"id": 7})))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.lookup(&fp).await.unwrap().is_none());
    }
}
