use common::errors::AppError;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds inside the resolution pipeline.
///
/// Only `NotFound` and `InvalidInput` survive the mapping to [`AppError`] with
/// their meaning intact; the rest become a generic internal error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeatherError {
    #[error("city not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider {provider} unavailable: {reason}")]
    UpstreamUnavailable { provider: String, reason: String },

    #[error("no weather provider left in chain")]
    ChainExhausted,

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("timed out after {0:?} waiting for cache fill")]
    LockTimeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

impl WeatherError {
    pub fn upstream(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<WeatherError> for AppError {
    fn from(err: WeatherError) -> Self {
        match err {
            WeatherError::NotFound => AppError::CityNotFound,
            WeatherError::InvalidInput(message) => AppError::InvalidRequest(message),
            WeatherError::UpstreamUnavailable { .. }
            | WeatherError::ChainExhausted
            | WeatherError::CacheUnavailable(_)
            | WeatherError::LockTimeout(_)
            | WeatherError::Cancelled => AppError::InternalServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_failures_collapse_to_500() {
        let internal = [
            WeatherError::upstream("weatherapi", "connection refused"),
            WeatherError::ChainExhausted,
            WeatherError::CacheUnavailable("down".into()),
            WeatherError::LockTimeout(Duration::from_secs(3)),
            WeatherError::Cancelled,
        ];
        for err in internal {
            assert_eq!(AppError::from(err), AppError::InternalServerError);
        }
    }

    #[test]
    fn caller_facing_kinds_are_preserved() {
        assert_eq!(AppError::from(WeatherError::NotFound), AppError::CityNotFound);
        assert_eq!(
            AppError::from(WeatherError::InvalidInput("city is required".into())),
            AppError::invalid("city is required")
        );
    }
}
