use async_trait::async_trait;
use common::models::WeatherResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::{CacheError, CacheResult, CacheSettings, CacheStore, poll_for_value};
use crate::context::RequestContext;

struct CacheEntry {
    data: WeatherResult,
    expires_at: Instant,
}

/// Lock marker tagged with the request that acquired it.
struct LockMarker {
    owner: Uuid,
    expires_at: Instant,
}

/// In-process store for single-instance deployments and tests.
///
/// Values and lock markers carry their own expiry; expired records read as
/// absent and are pruned on the next write.
#[derive(Clone)]
pub struct MemoryCacheStore {
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    locks: Arc<RwLock<HashMap<String, LockMarker>>>,
    settings: CacheSettings,
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("settings", &self.settings)
            .finish()
    }
}

impl MemoryCacheStore {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(RwLock::new(HashMap::new())),
            settings,
        }
    }

    /// Whether a live lock marker exists for `city`.
    pub async fn is_locked(&self, city: &str) -> bool {
        let locks = self.locks.read().await;
        locks
            .get(city)
            .is_some_and(|marker| marker.expires_at > Instant::now())
    }

    async fn lookup(&self, city: &str) -> Option<WeatherResult> {
        let cache = self.cache.read().await;
        if let Some(entry) = cache.get(city)
            && entry.expires_at > Instant::now()
        {
            return Some(entry.data.clone());
        }
        None
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, _ctx: &RequestContext, city: &str) -> CacheResult<Option<WeatherResult>> {
        Ok(self.lookup(city).await)
    }

    async fn set(
        &self,
        _ctx: &RequestContext,
        city: &str,
        value: &WeatherResult,
    ) -> CacheResult<()> {
        let mut cache = self.cache.write().await;
        let now = Instant::now();
        cache.retain(|_, entry| entry.expires_at > now);
        cache.insert(
            city.to_string(),
            CacheEntry {
                data: value.clone(),
                expires_at: now + self.settings.cache_ttl,
            },
        );
        Ok(())
    }

    async fn acquire_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<bool> {
        let mut locks = self.locks.write().await;
        let now = Instant::now();

        if locks.get(city).is_some_and(|marker| marker.expires_at > now) {
            return Ok(false);
        }

        locks.retain(|_, marker| marker.expires_at > now);
        locks.insert(
            city.to_string(),
            LockMarker {
                owner: ctx.request_id(),
                expires_at: now + self.settings.lock_ttl,
            },
        );
        Ok(true)
    }

    async fn wait_for_unlock(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> CacheResult<WeatherResult> {
        poll_for_value(ctx, &self.settings, move || async move {
            Ok::<_, CacheError>(self.lookup(city).await)
        })
        .await
    }

    /// Only the request that acquired the lock may remove it; a leader whose
    /// lock expired and was taken over leaves the new holder alone.
    async fn release_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<()> {
        let mut locks = self.locks.write().await;
        if locks
            .get(city)
            .is_some_and(|marker| marker.owner == ctx.request_id())
        {
            locks.remove(city);
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
