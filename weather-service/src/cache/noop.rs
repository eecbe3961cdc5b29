use async_trait::async_trait;
use common::models::WeatherResult;
use std::time::Duration;

use super::{CacheError, CacheResult, CacheStore};
use crate::context::RequestContext;

/// Store that caches nothing: every lookup misses and every lock is granted.
///
/// With it the service degenerates to a plain pass-through to the provider
/// chain.
#[derive(Debug, Clone, Default)]
pub struct NoopCacheStore;

impl NoopCacheStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _ctx: &RequestContext, _city: &str) -> CacheResult<Option<WeatherResult>> {
        Ok(None)
    }

    async fn set(
        &self,
        _ctx: &RequestContext,
        _city: &str,
        _value: &WeatherResult,
    ) -> CacheResult<()> {
        Ok(())
    }

    async fn acquire_lock(&self, _ctx: &RequestContext, _city: &str) -> CacheResult<bool> {
        Ok(true)
    }

    async fn wait_for_unlock(
        &self,
        _ctx: &RequestContext,
        _city: &str,
    ) -> CacheResult<WeatherResult> {
        // Nobody ever writes, so there is nothing to wait for.
        Err(CacheError::LockTimeout(Duration::ZERO))
    }

    async fn release_lock(&self, _ctx: &RequestContext, _city: &str) -> CacheResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }
}
