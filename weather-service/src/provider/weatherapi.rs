use async_trait::async_trait;
use common::http_client::HttpClient;
use common::models::WeatherResult;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

use super::{WeatherProvider, settle};
use crate::context::RequestContext;
use crate::error::WeatherError;

pub const DEFAULT_URL: &str = "https://api.weatherapi.com/v1/current.json";

#[derive(Debug, Deserialize)]
struct WeatherApiResponse {
    current: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temp_c: f64,
    humidity: i64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct Condition {
    text: String,
}

impl From<WeatherApiResponse> for WeatherResult {
    fn from(response: WeatherApiResponse) -> Self {
        Self {
            temperature: response.current.temp_c,
            humidity: response.current.humidity,
            description: response.current.condition.text,
        }
    }
}

/// weatherapi.com current conditions.
#[derive(Debug)]
pub struct WeatherApiProvider {
    http: HttpClient,
    api_key: String,
    base_url: String,
    next: Option<Arc<dyn WeatherProvider>>,
}

impl WeatherApiProvider {
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
impl WeatherProvider for WeatherApiProvider {
    #[instrument(skip(self, ctx), fields(provider = "weatherapi"))]
    async fn get_weather(
        &self,
        ctx: &RequestContext,
        city: &str,
    ) -> Result<WeatherResult, WeatherError> {
        let query = [("key", self.api_key.as_str()), ("q", city), ("aqi", "no")];

        let outcome = self
            .http
            .get_json::<WeatherApiResponse>(ctx.cancel_token(), &self.base_url, &query)
            .await
            .map(WeatherResult::from);

        settle(ctx, self.name(), self.next.as_ref(), city, outcome).await
    }

    fn set_next(&mut self, next: Arc<dyn WeatherProvider>) {
        self.next = Some(next);
    }

    fn name(&self) -> &str {
        "weatherapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, query_param},
    };

    #[tokio::test]
    async fn maps_current_conditions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "secret"))
            .and(query_param("q", "Kyiv"))
            .and(query_param("aqi", "no"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "location": { "name": "Kyiv", "region": "", "country": "Ukraine" },
                "current": {
                    "temp_c": 12.5,
                    "humidity": 71,
                    "condition": { "text": "Light rain" }
                }
            })))
            .mount(&server)
            .await;

        let provider =
            WeatherApiProvider::new(HttpClient::default(), "secret".into(), server.uri());
        let result = provider
            .get_weather(&RequestContext::default(), "Kyiv")
            .await
            .expect("provider should answer");

        assert_eq!(
            result,
            WeatherResult {
                temperature: 12.5,
                humidity: 71,
                description: "Light rain".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "City not found" })))
            .mount(&server)
            .await;

        let provider =
            WeatherApiProvider::new(HttpClient::default(), "secret".into(), server.uri());
        let err = provider
            .get_weather(&RequestContext::default(), "Atlantis")
            .await
            .unwrap_err();

        assert_eq!(err, WeatherError::NotFound);
    }

    #[tokio::test]
    async fn server_error_without_fallback_exhausts_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider =
            WeatherApiProvider::new(HttpClient::default(), "secret".into(), server.uri());
        let err = provider
            .get_weather(&RequestContext::default(), "Kyiv")
            .await
            .unwrap_err();

        assert_eq!(err, WeatherError::ChainExhausted);
    }
}
