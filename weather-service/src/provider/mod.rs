//! Upstream weather providers and the fixed fallback chain built from them.
//!
//! Each provider owns an optional link to the next one. A provider that cannot
//! answer (transport failure, unexpected status, undecodable body) hands the
//! request down the chain; a "city not found" answer is final and returned
//! as-is.

use async_trait::async_trait;
use common::http_client::UpstreamError;
use common::models::WeatherResult;
use std::fmt::{self, Debug};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError};
use crate::context::RequestContext;
use crate::error::WeatherError;

pub mod openweathermap;
pub mod weatherapi;

pub use openweathermap::OpenWeatherMapProvider;
pub use weatherapi::WeatherApiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    WeatherApi,
    OpenWeatherMap,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::WeatherApi => "weatherapi",
            ProviderKind::OpenWeatherMap => "openweathermap",
        }
    }

    pub const fn all() -> &'static [ProviderKind] {
        &[ProviderKind::WeatherApi, ProviderKind::OpenWeatherMap]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderKind {
    type Error = ChainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "weatherapi" => Ok(ProviderKind::WeatherApi),
            "openweathermap" | "openweather" => Ok(ProviderKind::OpenWeatherMap),
            _ => Err(ChainError::UnknownProvider(value.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("at least one weather provider is required")]
    Empty,

    #[error("unknown provider '{0}', supported providers: weatherapi, openweathermap")]
    UnknownProvider(String),
}

/// One upstream weather source, linkable to a fallback.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn get_weather(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError>;

    /// Link the provider consulted when this one cannot answer.
    fn set_next(&mut self, next: Arc<dyn WeatherProvider>);

    fn name(&self) -> &str;
}

/// Delegate to `next` after the current provider failed with `err`.
///
/// The tail of the chain answers with [`WeatherError::ChainExhausted`].
pub async fn try_next(
    ctx: &RequestContext,
    next: Option<&Arc<dyn WeatherProvider>>,
    city: &str,
    err: WeatherError,
) -> Result<WeatherResult, WeatherError> {
    warn!(error = %err, "Provider failed");

    match next {
        Some(next) => {
            info!(next = next.name(), "Falling back to next provider");
            next.get_weather(ctx, city).await
        }
        None => {
            error!("No next provider available");
            Err(WeatherError::ChainExhausted)
        }
    }
}

/// Turn the outcome of one upstream call into the provider's answer.
pub(crate) async fn settle(
    ctx: &RequestContext,
    provider: &str,
    next: Option<&Arc<dyn WeatherProvider>>,
    city: &str,
    outcome: Result<WeatherResult, UpstreamError>,
) -> Result<WeatherResult, WeatherError> {
    match outcome {
        Ok(result) => Ok(result),
        Err(UpstreamError::Status(404)) => {
            info!(provider, city, "City not found upstream");
            Err(WeatherError::NotFound)
        }
        Err(UpstreamError::Cancelled) => Err(WeatherError::Cancelled),
        Err(err) => try_next(ctx, next, city, WeatherError::upstream(provider, err)).await,
    }
}

/// Fixed, acyclic fallback sequence. Every lookup starts at the head.
#[derive(Debug, Clone)]
pub struct ProviderChain {
    head: Arc<dyn WeatherProvider>,
    names: Vec<String>,
}

impl ProviderChain {
    /// Link `providers` in order, so that `providers[i]` falls back to
    /// `providers[i + 1]`.
    pub fn new(providers: Vec<Box<dyn WeatherProvider>>) -> Result<Self, ChainError> {
        let names = providers.iter().map(|p| p.name().to_string()).collect();

        // Wire from the tail so each provider is linked before it is shared.
        let mut remaining = providers.into_iter().rev();
        let mut head: Arc<dyn WeatherProvider> =
            Arc::from(remaining.next().ok_or(ChainError::Empty)?);
        for mut provider in remaining {
            provider.set_next(head);
            head = Arc::from(provider);
        }

        Ok(Self { head, names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub async fn get_weather(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        self.head.get_weather(ctx, city).await
    }
}

/// Construct one provider from its configured credentials.
pub fn provider_from_config(
    kind: ProviderKind,
    config: &Config,
) -> Result<Box<dyn WeatherProvider>, ConfigError> {
    let settings = config.provider_settings(kind)?;
    let http = config.upstream_client();

    let boxed: Box<dyn WeatherProvider> = match kind {
        ProviderKind::WeatherApi => Box::new(WeatherApiProvider::new(
            http,
            settings.api_key.clone(),
            settings.base_url.clone(),
        )),
        ProviderKind::OpenWeatherMap => Box::new(OpenWeatherMapProvider::new(
            http,
            settings.api_key.clone(),
            settings.base_url.clone(),
        )),
    };

    Ok(boxed)
}

/// Build the chain in the configured provider order.
pub fn chain_from_config(config: &Config) -> Result<ProviderChain, ConfigError> {
    let providers = config
        .providers
        .iter()
        .map(|kind| provider_from_config(*kind, config))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProviderChain::new(providers)?)
}
