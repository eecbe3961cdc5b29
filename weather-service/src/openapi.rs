use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::WeatherResult;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_weather,
        handlers::metrics,
    ),
    components(schemas(WeatherResult)),
    tags(
        (name = "weather", description = "Weather data endpoints"),
    ),
)]
struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
