//! Cache and lock store consumed by the resolution service.
//!
//! The store holds resolved weather per city with a TTL and offers a
//! self-expiring, set-if-absent lock used to elect a single leader per city.

use async_trait::async_trait;
use common::models::WeatherResult;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::WeatherError;

pub mod memory;
pub mod noop;
#[cfg(feature = "cache-redis")]
pub mod redis;

pub use memory::MemoryCacheStore;
pub use noop::NoopCacheStore;
#[cfg(feature = "cache-redis")]
pub use self::redis::RedisCacheStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Timed out after {0:?} waiting for cache fill")]
    LockTimeout(Duration),

    #[error("Wait for cache fill cancelled")]
    Cancelled,
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<CacheError> for WeatherError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Backend(msg) | CacheError::Serialization(msg) => {
                WeatherError::CacheUnavailable(msg)
            }
            CacheError::LockTimeout(waited) => WeatherError::LockTimeout(waited),
            CacheError::Cancelled => WeatherError::Cancelled,
        }
    }
}

/// Timing knobs shared by every store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub cache_ttl: Duration,
    pub lock_ttl: Duration,
    pub lock_retry_interval: Duration,
    pub lock_max_wait: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            lock_ttl: Duration::from_secs(3),
            lock_retry_interval: Duration::from_millis(100),
            lock_max_wait: Duration::from_secs(3),
        }
    }
}

/// Key-value store with TTL and a set-if-absent lock.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// `Ok(None)` is a miss; `Err` means the store itself is unavailable.
    async fn get(&self, ctx: &RequestContext, city: &str) -> CacheResult<Option<WeatherResult>>;

    /// Store `value` under `city` with the configured cache TTL.
    async fn set(&self, ctx: &RequestContext, city: &str, value: &WeatherResult)
    -> CacheResult<()>;

    /// Non-blocking attempt to become the leader for `city`. The lock is
    /// tagged with the request id of `ctx`.
    async fn acquire_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<bool>;

    /// Block until a value for `city` shows up, the max wait elapses or the
    /// caller is cancelled.
    async fn wait_for_unlock(&self, ctx: &RequestContext, city: &str)
    -> CacheResult<WeatherResult>;

    /// Drop the lock for `city` if `ctx` still owns it. Releasing a free or
    /// foreign lock is not an error.
    async fn release_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<()>;

    fn provider_name(&self) -> &'static str;
}

/// Pick the store for this deployment: none when caching is disabled, Redis
/// when configured and reachable, otherwise the in-process store.
pub async fn store_from_config(config: &Config) -> Arc<dyn CacheStore> {
    if !config.cache_enabled {
        info!(backend = "noop", "Caching disabled");
        return Arc::new(NoopCacheStore::new());
    }

    if let Some(url) = &config.redis_url
        && let Some(store) = redis_store(url, config.cache).await
    {
        return store;
    }

    info!(backend = "memory", "In-process cache store initialized");
    Arc::new(MemoryCacheStore::new(config.cache))
}

#[cfg(feature = "cache-redis")]
async fn redis_store(url: &str, settings: CacheSettings) -> Option<Arc<dyn CacheStore>> {
    match RedisCacheStore::connect(url, settings).await {
        Ok(store) => {
            info!(backend = "redis", "Distributed cache store initialized");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis, falling back to in-process cache");
            None
        }
    }
}

#[cfg(not(feature = "cache-redis"))]
async fn redis_store(_url: &str, _settings: CacheSettings) -> Option<Arc<dyn CacheStore>> {
    warn!("REDIS_URL is set but the 'cache-redis' feature is not enabled, using in-process cache");
    None
}

pub fn cache_key(city: &str) -> String {
    format!("weather:city:{city}")
}

pub fn lock_key(city: &str) -> String {
    format!("weather:lock:{city}")
}

/// Poll `probe` every `retry_interval` until it yields a value.
///
/// Sleeps before the first probe: callers only get here after losing the lock
/// race, so the leader has just started its upstream call.
pub(crate) async fn poll_for_value<F, Fut>(
    ctx: &RequestContext,
    settings: &CacheSettings,
    mut probe: F,
) -> CacheResult<WeatherResult>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CacheResult<Option<WeatherResult>>>,
{
    let started = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => return Err(CacheError::Cancelled),
            _ = tokio::time::sleep(settings.lock_retry_interval) => {}
        }

        if let Some(value) = probe().await? {
            debug!(waited_ms = started.elapsed().as_millis() as u64, "Cache filled by leader");
            return Ok(value);
        }

        let waited = started.elapsed();
        if waited >= settings.lock_max_wait {
            return Err(CacheError::LockTimeout(waited));
        }
    }
}
