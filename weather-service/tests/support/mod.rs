//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use common::models::WeatherResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use weather_service::cache::{CacheResult, MemoryCacheStore};
use weather_service::provider::try_next;
use weather_service::{
    CacheError, CacheSettings, CacheStore, ProviderChain, RequestContext, WeatherError,
    WeatherProvider, WeatherService,
};

pub fn cloudy() -> WeatherResult {
    WeatherResult {
        temperature: 0.0,
        humidity: 33,
        description: "Cloudy".to_string(),
    }
}

pub fn sunny() -> WeatherResult {
    WeatherResult {
        temperature: 27.5,
        humidity: 20,
        description: "Sunny".to_string(),
    }
}

/// Short timings so lock waits finish quickly in tests.
pub fn fast_settings() -> CacheSettings {
    CacheSettings {
        cache_ttl: Duration::from_secs(60),
        lock_ttl: Duration::from_secs(3),
        lock_retry_interval: Duration::from_millis(20),
        lock_max_wait: Duration::from_secs(2),
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Respond(WeatherResult),
    TransportFailure,
    NotFound,
}

/// Provider with scripted behaviour that counts its invocations.
#[derive(Debug)]
pub struct FakeProvider {
    name: String,
    behavior: Behavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    next: Option<Arc<dyn WeatherProvider>>,
}

impl FakeProvider {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            next: None,
        }
    }

    pub fn responding(name: &str, result: WeatherResult) -> Self {
        Self::new(name, Behavior::Respond(result))
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, Behavior::TransportFailure)
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(name, Behavior::NotFound)
    }

    /// Simulated upstream latency; honours caller cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    async fn get_weather(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Err(WeatherError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        match &self.behavior {
            Behavior::Respond(result) => Ok(result.clone()),
            Behavior::NotFound => Err(WeatherError::NotFound),
            Behavior::TransportFailure => {
                let err = WeatherError::upstream(&self.name, "connection refused");
                try_next(ctx, self.next.as_ref(), city, err).await
            }
        }
    }

    fn set_next(&mut self, next: Arc<dyn WeatherProvider>) {
        self.next = Some(next);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn chain(providers: Vec<FakeProvider>) -> ProviderChain {
    let boxed = providers
        .into_iter()
        .map(|p| Box::new(p) as Box<dyn WeatherProvider>)
        .collect();
    ProviderChain::new(boxed).expect("at least one provider")
}

/// In-memory store with switchable faults and a release counter.
#[derive(Debug)]
pub struct FaultyStore {
    pub inner: MemoryCacheStore,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_lock: AtomicBool,
    pub releases: AtomicUsize,
}

impl FaultyStore {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            inner: MemoryCacheStore::new(settings),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_lock: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn fault(flag: &AtomicBool, what: &str) -> CacheResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::Backend(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FaultyStore {
    async fn get(&self, ctx: &RequestContext, city: &str) -> CacheResult<Option<WeatherResult>> {
        Self::fault(&self.fail_get, "get")?;
        self.inner.get(ctx, city).await
    }

    async fn set(
        &self,
        ctx: &RequestContext,
        city: &str,
        value: &WeatherResult,
    ) -> CacheResult<()> {
        Self::fault(&self.fail_set, "set")?;
        self.inner.set(ctx, city, value).await
    }

    async fn acquire_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<bool> {
        Self::fault(&self.fail_lock, "lock")?;
        self.inner.acquire_lock(ctx, city).await
    }

    async fn wait_for_unlock(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> CacheResult<WeatherResult> {
        self.inner.wait_for_unlock(ctx, city).await
    }

    async fn release_lock(&self, ctx: &RequestContext, city: &str) -> CacheResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release_lock(ctx, city).await
    }

    fn provider_name(&self) -> &'static str {
        "faulty"
    }
}

pub fn service_with(store: Arc<dyn CacheStore>, providers: Vec<FakeProvider>) -> WeatherService {
    WeatherService::new(chain(providers), store)
}
