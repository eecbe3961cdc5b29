use axum::{
    Router,
    extract::{MatchedPath, Query, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use common::errors::AppError;
use common::models::WeatherResult;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::metrics::HttpMetrics;
use crate::openapi;
use crate::service::WeatherService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
    /// Cancelled on shutdown; every request token is derived from it.
    pub shutdown: CancellationToken,
    pub http_metrics: Arc<HttpMetrics>,
}

impl AppState {
    pub fn new(service: Arc<WeatherService>, shutdown: CancellationToken) -> Self {
        Self {
            service,
            shutdown,
            http_metrics: Arc::new(HttpMetrics::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/weather", get(get_weather))
        .route("/metrics", get(metrics))
        .merge(openapi::swagger_ui())
        .route_layer(middleware::from_fn_with_state(
            state.http_metrics.clone(),
            track_request_duration,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Records handler latency under the matched route template.
async fn track_request_duration(
    State(http_metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    http_metrics
        .observe(&method, &route, response.status().as_u16(), started.elapsed())
        .await;
    response
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "weather-service",
        "cache": state.service.store_name(),
        "providers": state.service.provider_names(),
    }))
}

#[derive(Deserialize)]
pub struct WeatherParams {
    pub city: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/weather",
    params(
        ("city" = String, Query, description = "City name")
    ),
    responses(
        (status = 200, description = "Current weather for the city", body = WeatherResult),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "City not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "weather"
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherParams>,
) -> Result<Json<WeatherResult>, AppError> {
    let city = params
        .city
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::invalid("city is required"))?;

    let ctx = RequestContext::child_of(&state.shutdown);
    info!(city = %city, request_id = %ctx.request_id(), "Weather request received");

    let weather = state.service.resolve(&ctx, &city).await.inspect_err(|err| {
        warn!(city = %city, code = err.code(), error = %err, "Weather request failed");
    })?;

    Ok(Json(weather))
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Cache and HTTP metrics in Prometheus text format")
    )
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.service.metrics().render_prometheus();
    body.push_str(&state.http_metrics.render_prometheus().await);

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
