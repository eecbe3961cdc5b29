use common::http_client::HttpClient;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheSettings;
use crate::provider::{ChainError, ProviderKind, openweathermap, weatherapi};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("no API key configured for provider '{0}'")]
    MissingApiKey(ProviderKind),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Credentials and endpoint of one upstream provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Provider order; the first entry is consulted first.
    pub providers: Vec<ProviderKind>,
    pub weather_api: ProviderSettings,
    pub open_weather_map: ProviderSettings,
    pub upstream_timeout: Duration,
    /// When false every lookup goes straight to the provider chain.
    pub cache_enabled: bool,
    pub cache: CacheSettings,
    pub redis_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let providers = parse_providers(
            &var("WEATHER_PROVIDERS").unwrap_or_else(|| "weatherapi,openweathermap".to_string()),
        )?;

        let defaults = CacheSettings::default();
        let cache = CacheSettings {
            cache_ttl: Duration::from_secs(parse_or(
                &var,
                "CACHE_TTL_SECONDS",
                defaults.cache_ttl.as_secs(),
            )?),
            lock_ttl: Duration::from_millis(parse_or(
                &var,
                "LOCK_TTL_MS",
                defaults.lock_ttl.as_millis() as u64,
            )?),
            lock_retry_interval: Duration::from_millis(parse_nonzero_or(
                &var,
                "LOCK_RETRY_MS",
                defaults.lock_retry_interval.as_millis() as u64,
            )?),
            lock_max_wait: Duration::from_millis(parse_or(
                &var,
                "LOCK_MAX_WAIT_MS",
                defaults.lock_max_wait.as_millis() as u64,
            )?),
        };

        Ok(Self {
            port: parse_or(&var, "PORT", 3002)?,
            providers,
            weather_api: ProviderSettings {
                api_key: var("WEATHER_API_KEY").unwrap_or_default(),
                base_url: var("WEATHER_API_URL")
                    .unwrap_or_else(|| weatherapi::DEFAULT_URL.to_string()),
            },
            open_weather_map: ProviderSettings {
                api_key: var("OPENWEATHER_API_KEY").unwrap_or_default(),
                base_url: var("OPENWEATHER_API_URL")
                    .unwrap_or_else(|| openweathermap::DEFAULT_URL.to_string()),
            },
            upstream_timeout: Duration::from_millis(parse_or(&var, "UPSTREAM_TIMEOUT_MS", 5000)?),
            cache_enabled: parse_or(&var, "CACHE_ENABLED", true)?,
            cache,
            redis_url: var("REDIS_URL"),
        })
    }

    /// Settings of a provider that is about to be used; it must have a key.
    pub fn provider_settings(&self, kind: ProviderKind) -> Result<&ProviderSettings, ConfigError> {
        let settings = match kind {
            ProviderKind::WeatherApi => &self.weather_api,
            ProviderKind::OpenWeatherMap => &self.open_weather_map,
        };

        if settings.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey(kind));
        }
        Ok(settings)
    }

    pub fn upstream_client(&self) -> HttpClient {
        HttpClient::new(self.upstream_timeout)
    }
}

fn parse_providers(raw: &str) -> Result<Vec<ProviderKind>, ConfigError> {
    let providers = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ProviderKind::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    if providers.is_empty() {
        return Err(ChainError::Empty.into());
    }
    Ok(providers)
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

/// Like [`parse_or`], for intervals where zero would mean a busy loop.
fn parse_nonzero_or<F>(var: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(var, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("defaults are valid");

        assert_eq!(config.port, 3002);
        assert_eq!(
            config.providers,
            vec![ProviderKind::WeatherApi, ProviderKind::OpenWeatherMap]
        );
        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.weather_api.base_url, weatherapi::DEFAULT_URL);
        assert!(config.redis_url.is_none());
        assert!(config.cache_enabled);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("WEATHER_PROVIDERS", "openweathermap, weatherapi"),
            ("CACHE_TTL_SECONDS", "60"),
            ("LOCK_TTL_MS", "1500"),
            ("LOCK_RETRY_MS", "50"),
            ("LOCK_MAX_WAIT_MS", "2000"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("CACHE_ENABLED", "false"),
        ])
        .expect("valid overrides");

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.providers,
            vec![ProviderKind::OpenWeatherMap, ProviderKind::WeatherApi]
        );
        assert_eq!(config.cache.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.cache.lock_ttl, Duration::from_millis(1500));
        assert_eq!(config.cache.lock_retry_interval, Duration::from_millis(50));
        assert_eq!(config.cache.lock_max_wait, Duration::from_secs(2));
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert!(!config.cache_enabled);
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = config_from(&[("LOCK_TTL_MS", "three")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LOCK_TTL_MS", .. }));
    }

    #[test]
    fn zero_retry_interval_is_rejected() {
        let err = config_from(&[("LOCK_RETRY_MS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "LOCK_RETRY_MS", ref value } if value == "0"
        ));
    }

    #[test]
    fn empty_provider_list_is_fatal() {
        let err = config_from(&[("WEATHER_PROVIDERS", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Chain(ChainError::Empty)));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = config_from(&[("WEATHER_PROVIDERS", "weatherapi,darksky")]).unwrap_err();
        assert!(matches!(err, ConfigError::Chain(ChainError::UnknownProvider(_))));
    }

    #[test]
    fn provider_without_key_cannot_be_used() {
        let config = config_from(&[("WEATHER_API_KEY", "abc")]).expect("valid config");

        assert!(config.provider_settings(ProviderKind::WeatherApi).is_ok());
        assert!(matches!(
            config.provider_settings(ProviderKind::OpenWeatherMap),
            Err(ConfigError::MissingApiKey(ProviderKind::OpenWeatherMap))
        ));
    }

    #[test]
    fn chain_is_built_in_configured_order() {
        let config = config_from(&[
            ("WEATHER_PROVIDERS", "openweathermap,weatherapi"),
            ("WEATHER_API_KEY", "a"),
            ("OPENWEATHER_API_KEY", "b"),
        ])
        .expect("valid config");

        let chain = crate::provider::chain_from_config(&config).expect("chain");
        assert_eq!(chain.names(), ["openweathermap", "weatherapi"]);
    }
}
