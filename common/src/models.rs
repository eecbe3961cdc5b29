use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Current weather for a city, as returned to callers and stored in the cache.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct WeatherResult {
    pub temperature: f64,
    pub humidity: i64,
    pub description: String,
}

/// Weather lookup request
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct WeatherQuery {
    pub city: String,
}

impl WeatherQuery {
    pub fn new(city: impl Into<String>) -> Self {
        Self { city: city.into() }
    }

    /// City with surrounding whitespace removed, as sent upstream.
    pub fn trimmed(&self) -> &str {
        self.city.trim()
    }

    /// Key shared by concurrent lookups of the same city.
    pub fn coalescing_key(&self) -> String {
        self.trimmed().to_lowercase()
    }
}
