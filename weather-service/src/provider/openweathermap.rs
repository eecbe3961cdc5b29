use async_trait::async_trait;
use common::http_client::HttpClient;
use common::models::WeatherResult;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

use super::{WeatherProvider, settle};
use crate::context::RequestContext;
use crate::error::WeatherError;

pub const DEFAULT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: i64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

impl From<OwCurrentResponse> for WeatherResult {
    fn from(response: OwCurrentResponse) -> Self {
        let description = response
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .unwrap_or_default();

        Self {
            temperature: response.main.temp,
            humidity: response.main.humidity,
            description,
        }
    }
}

/// OpenWeatherMap current weather, metric units.
#[derive(Debug)]
pub struct OpenWeatherMapProvider {
    http: HttpClient,
    api_key: String,
    base_url: String,
    next: Option<Arc<dyn WeatherProvider>>,
}

impl OpenWeatherMapProvider {
    pub fn new(http: HttpClient, api_key: String, base_url: String) -> Self {
        Self {
            http,
            api_key,
            base_url,
            next: None,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    #[instrument(skip(self, ctx), fields(provider = "openweathermap"))]
    async fn get_weather(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        let query = [
            ("q", city),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ];

        let outcome = self
            .http
            .get_json::<OwCurrentResponse>(ctx.cancel_token(), &self.base_url, &query)
            .await
            .map(WeatherResult::from);

        settle(ctx, self.name(), self.next.as_ref(), city, outcome).await
    }

    fn set_next(&mut self, next: Arc<dyn WeatherProvider>) {
        self.next = Some(next);
    }

    fn name(&self) -> &str {
        "openweathermap"
    }
}
