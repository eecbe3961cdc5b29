use common::tracing::init_tracing_from_env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use weather_service::handlers::{self, AppState};
use weather_service::{Config, WeatherService, cache, provider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_from_env();

    let config = Config::from_env().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let cancellation_token = CancellationToken::new();

    let chain = provider::chain_from_config(&config)
        .inspect_err(|e| error!(error = %e, "Failed to build provider chain"))?;
    info!(providers = ?chain.names(), "Provider chain wired");

    let store = cache::store_from_config(&config).await;
    let service = Arc::new(WeatherService::new(chain, store));

    let state = AppState::new(service, cancellation_token.clone());
    let app = handlers::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Weather service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation_token))
        .await?;

    info!("Weather service stopped");
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    // Unblocks lock waiters and aborts in-flight upstream calls.
    cancellation_token.cancel();
    warn!("Cancelled in-flight requests, shutting down gracefully...");
}
