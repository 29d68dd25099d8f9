//! The cache collaborator. Computed analytics are stored as JSON text under a key that names the
//! endpoint and every parameter that distinguishes one result from another. The cache is only an
//! optimization: failing to read or write it is logged and the request carries on.

mod memory;
mod redis_cache;

use crate::error::{ErrorType, IntoResult, Res, Result};
use crate::Config;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::form_urlencoded;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// How long results live, by how often their source data changes.
pub struct Ttl;

impl Ttl {
    pub const HOURS_3: Duration = Duration::from_secs(3 * HOUR);
    pub const HOURS_12: Duration = Duration::from_secs(12 * HOUR);
    pub const HOURS_24: Duration = Duration::from_secs(24 * HOUR);
    pub const DAYS_3: Duration = Duration::from_secs(3 * DAY);
    pub const DAYS_6: Duration = Duration::from_secs(6 * DAY);
    pub const DAYS_7: Duration = Duration::from_secs(7 * DAY);
    pub const DAYS_30: Duration = Duration::from_secs(30 * DAY);
}

/// A key-value store with expiring entries.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Res<Option<String>>;

    /// Stores `value` under `key` for `ttl`, replacing any earlier value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Res<()>;

    /// Removes every entry.
    async fn flush_all(&self) -> Res<()>;
}

/// Connects to Redis when `redis_url` is configured, otherwise uses an in-process cache.
pub async fn connect(config: &Config) -> Result<Arc<dyn Cache>> {
    match config.redis_url() {
        Some(url) => {
            let cache = RedisCache::connect(url).await.pub_result(ErrorType::Cache)?;
            info!("Using the Redis cache");
            Ok(Arc::new(cache))
        }
        None => {
            info!("No redis_url is configured, using an in-process cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

/// A cache key: the endpoint name followed by its discriminating parameters, separated by `:`.
/// Parameters are percent-encoded so that a `:` inside one cannot shift the others.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str) -> Self {
        Self(endpoint.to_string())
    }

    /// Appends a parameter. Absent parameters still take a position so that keys stay aligned.
    pub fn part(mut self, value: impl AsRef<str>) -> Self {
        self.0.push(':');
        self.0
            .extend(form_urlencoded::byte_serialize(value.as_ref().as_bytes()));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the cached JSON for `key` when there is one. Otherwise runs `compute`, serializes its
/// output and, if `store` accepts the value, writes it to the cache for `ttl` before returning it.
///
/// Errors from `compute` are returned without touching the cache.
pub async fn cached<T, F, Fut>(
    cache: &dyn Cache,
    key: &CacheKey,
    ttl: Duration,
    store: impl FnOnce(&T) -> bool,
    compute: F,
) -> Result<String>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match cache.get(key.as_str()).await {
        Ok(Some(hit)) => {
            debug!("Cache hit for {key}");
            return Ok(hit);
        }
        Ok(None) => debug!("Cache miss for {key}"),
        Err(e) => warn!("Unable to read {key} from the cache: {e:#}"),
    }

    let value = compute().await?;
    let json = serde_json::to_string(&value).pub_result(ErrorType::Internal)?;
    if store(&value) {
        if let Err(e) = cache.set_ex(key.as_str(), &json, ttl).await {
            warn!("Unable to write {key} to the cache: {e:#}");
        }
    } else {
        debug!("Not caching {key}");
    }
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cache_key_parts() {
        let key = CacheKey::new("studentsVsBoxes").part("doc1").part("June 2024");
        assert_eq!(key.as_str(), "studentsVsBoxes:doc1:June+2024");

        let a = CacheKey::new("e").part("a:b").part("c");
        let b = CacheKey::new("e").part("a").part("b:c");
        assert_ne!(a, b);
        assert_eq!(CacheKey::new("e").part("").to_string(), "e:");
    }

    #[tokio::test]
    async fn test_cached_round_trip() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("test").part("1");
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let compute = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"total": 12.5, "title": "June 2024"}))
        };

        let first = cached(&cache, &key, Ttl::HOURS_3, |_| true, compute)
            .await
            .unwrap();
        let second = cached(&cache, &key, Ttl::HOURS_3, |_| true, compute)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let parsed: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(parsed["total"], 12.5);
    }

    #[tokio::test]
    async fn test_cached_skips_store() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("test");
        let json = cached(&cache, &key, Ttl::HOURS_3, |v: &Vec<u8>| !v.is_empty(), || async {
            Ok(Vec::<u8>::new())
        })
        .await
        .unwrap();
        assert_eq!(json, "[]");
        assert!(cache.get(key.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cached_error_is_not_stored() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("test");
        let e = cached(&cache, &key, Ttl::HOURS_3, |_: &u8| true, || async {
            Err::<u8, _>(Error::not_found("Worksheet 'x' not found"))
        })
        .await
        .unwrap_err();
        assert_eq!(e.error_type(), ErrorType::NotFound);
        assert!(cache.get(key.as_str()).await.unwrap().is_none());
    }

    struct BrokenCache;

    #[async_trait::async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _: &str) -> Res<Option<String>> {
            bail!("connection refused")
        }

        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Res<()> {
            bail!("connection refused")
        }

        async fn flush_all(&self) -> Res<()> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_cache_failures_are_swallowed() {
        let key = CacheKey::new("test");
        let json = cached(&BrokenCache, &key, Ttl::HOURS_3, |_| true, || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(json, "7");
    }
}
