//! Redis-backed store.
//!
//! Uses `redis::aio::ConnectionManager` for multiplexed connections with
//! automatic reconnection. Requires the `cache-redis` feature.

use async_trait::async_trait;
use common::models::WeatherResult;
use tracing::debug;

use super::{
    CacheError, CacheResult, CacheSettings, CacheStore, cache_key, lock_key, poll_for_value,
};
use crate::context::RequestContext;

/// Delete the lock only while it still carries the caller's token.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisCacheStore {
    connection_manager: redis::aio::ConnectionManager,
    settings: CacheSettings,
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("connection_manager", &"ConnectionManager")
            .field("settings", &self.settings)
            .finish()
    }
}

impl RedisCacheStore {
    pub async fn connect(url: &str, settings: CacheSettings) -> CacheResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Backend(format!("Failed to create Redis client: {}", e)))?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        debug!(url = %redact_url(url), "Redis cache store connected");

        Ok(Self {
            connection_manager,
            settings,
        })
    }

    async fn fetch(&self, city: &str) -> CacheResult<Option<WeatherResult>> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(cache_key(city))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis GET failed: {}", e)))?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, _ctx: &RequestContext, city: &str) -> CacheResult<Option<WeatherResult>> {
        let result = self.fetch(city).await?;
        if result.is_some() {
            debug!(city, "Cache HIT");
        } else {
            debug!(city, "Cache MISS");
        }
        Ok(result)
    }

    async fn set(
        &self,
        _ctx: &RequestContext,
        city: &str,
        value: &WeatherResult,
    ) -> CacheResult<()> {
        let raw = serde_json::to_string(value)?;
        let mut conn = self.connection_manager.clone();

        // Single SET with expiry: readers see either nothing or the full value.
        redis::cmd("SET")
            .arg(cache_key(city))
            .arg(raw)
            .arg("PX")
            .arg(millis(self.settings.cache_ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis SET failed: {}", e)))?;

        debug!(city, "Cache SET");
        Ok(())
    }

    async fn acquire_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key(city))
            .arg(ctx.request_id().to_string())
            .arg("NX")
            .arg("PX")
            .arg(millis(self.settings.lock_ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis SET NX failed: {}", e)))?;

        Ok(reply.is_some())
    }

    async fn wait_for_unlock(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> CacheResult<WeatherResult> {
        poll_for_value(ctx, &self.settings, move || self.fetch(city)).await
    }

    async fn release_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        let deleted: i64 = redis::cmd("EVAL")
            .arg(RELEASE_LOCK_SCRIPT)
            .arg(1)
            .arg(lock_key(city))
            .arg(ctx.request_id().to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis lock release failed: {}", e)))?;

        if deleted == 0 {
            debug!(city, "Lock already expired or held by another request");
        } else {
            debug!(city, "Lock released");
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

/// Strip credentials from a Redis URL before logging it.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
