//! Cache-aside resolution with per-city request coalescing.
//!
//! A lookup first consults the store. On a miss the first request for a city
//! takes the store lock and queries the provider chain (the leader); everyone
//! else for that city polls the store until the leader's value shows up.

use common::errors::AppError;
use common::models::{WeatherQuery, WeatherResult};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::cache::CacheStore;
use crate::context::RequestContext;
use crate::error::WeatherError;
use crate::metrics::CacheMetrics;
use crate::provider::ProviderChain;

pub struct WeatherService {
    chain: ProviderChain,
    store: Arc<dyn CacheStore>,
    metrics: Arc<CacheMetrics>,
}

impl WeatherService {
    pub fn new(chain: ProviderChain, store: Arc<dyn CacheStore>) -> Self {
        Self::with_metrics(chain, store, Arc::new(CacheMetrics::new()))
    }

    pub fn with_metrics(
        chain: ProviderChain,
        store: Arc<dyn CacheStore>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            chain,
            store,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn provider_names(&self) -> &[String] {
        self.chain.names()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.provider_name()
    }

    /// Current weather for `city`.
    ///
    /// The only entry point of the pipeline; every failure is reduced to one
    /// of the three [`AppError`] kinds.
    pub async fn resolve(&self, ctx: &RequestContext, city: &str) -> Result<WeatherResult, AppError> {
        self.resolve_inner(ctx, city)
            .instrument(ctx.span().clone())
            .await
            .map_err(AppError::from)
    }

    #[instrument(skip_all, fields(city = %city))]
    async fn resolve_inner(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        let query = WeatherQuery::new(city);
        let upstream_city = query.trimmed();
        if upstream_city.is_empty() {
            return Err(WeatherError::InvalidInput("city is required".to_string()));
        }
        let key = query.coalescing_key();

        match self.store.get(ctx, &key).await {
            Ok(Some(cached)) => {
                self.metrics.record_hit();
                debug!("Cache hit");
                return Ok(cached);
            }
            Ok(None) => self.metrics.record_miss(),
            Err(err) => {
                self.metrics.record_degraded();
                warn!(error = %err, "Cache unavailable, caching is skipped");
                return self.fetch_upstream(ctx, upstream_city).await;
            }
        }

        match self.store.acquire_lock(ctx, &key).await {
            Ok(true) => {
                let guard = LockGuard::new(self.store.clone(), ctx.clone(), key.clone());
                let result = self.lead(ctx, &key, upstream_city).await;
                guard.release().await;
                result
            }
            Ok(false) => self.follow(ctx, &key).await,
            Err(err) => {
                // Duplicate upstream calls are preferable to blocking on a
                // lock nobody may hold.
                warn!(error = %err, "Failed to acquire lock, resolving without it");
                self.fetch_and_populate(ctx, &key, upstream_city).await
            }
        }
    }

    async fn lead(
        &self,
        ctx: &RequestContext,
        key: &str,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        // A previous leader may have filled the cache between our miss and
        // our lock acquisition.
        if let Ok(Some(cached)) = self.store.get(ctx, key).await {
            self.metrics.record_hit();
            debug!("Cache filled while acquiring lock");
            return Ok(cached);
        }

        self.fetch_and_populate(ctx, key, city).await
    }

    async fn follow(&self, ctx: &RequestContext, key: &str) -> Result<WeatherResult, WeatherError> {
        info!("Resolution already in flight, waiting for cache fill");
        let started = Instant::now();
        let outcome = self.store.wait_for_unlock(ctx, key).await;
        self.metrics.record_lock_wait(started.elapsed());

        outcome.map_err(|err| {
            warn!(error = %err, "Waiting for cache fill failed");
            WeatherError::from(err)
        })
    }

    async fn fetch_and_populate(
        &self,
        ctx: &RequestContext,
        key: &str,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        let result = self.fetch_upstream(ctx, city).await?;

        if let Err(err) = self.store.set(ctx, key, &result).await {
            warn!(error = %err, "Failed to populate cache");
        }

        Ok(result)
    }

    async fn fetch_upstream(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        self.metrics.record_upstream_fetch();
        self.chain.get_weather(ctx, city).await.inspect_err(|err| {
            warn!(error = %err, "Provider chain failed");
        })
    }
}

/// Releases a held lock exactly once.
///
/// The normal path calls [`LockGuard::release`]. If the resolution future is
/// dropped before that (caller went away), the release is spawned from
/// `Drop`; without a runtime the lock TTL takes over.
struct LockGuard {
    store: Arc<dyn CacheStore>,
    ctx: RequestContext,
    key: String,
    released: bool,
}

impl LockGuard {
    fn new(store: Arc<dyn CacheStore>, ctx: RequestContext, key: String) -> Self {
        Self {
            store,
            ctx,
            key,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        release_lock(self.store.as_ref(), &self.ctx, &self.key).await;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let ctx = self.ctx.clone();
            let key = std::mem::take(&mut self.key);
            handle.spawn(async move { release_lock(store.as_ref(), &ctx, &key).await });
        }
    }
}

async fn release_lock(store: &dyn CacheStore, ctx: &RequestContext, key: &str) {
    match store.release_lock(ctx, key).await {
        Ok(()) => debug!(key, "Lock released"),
        Err(err) => warn!(error = %err, key, "Failed to release lock"),
    }
}
