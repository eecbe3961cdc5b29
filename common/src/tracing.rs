use tracing_subscriber::fmt::layer;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with structured JSON output
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default()
        .with(filter)
        .with(layer().json().with_current_span(true))
        .init();
}

/// Initialize tracing with pretty output for development
pub fn init_tracing_pretty() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Pick the output format from `LOG_FORMAT` (`json` or anything else for pretty).
pub fn init_tracing_from_env() {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => init_tracing(),
        _ => init_tracing_pretty(),
    }
}
