use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use moto_ride::api;
use moto_ride::config::Config;
use moto_ride::error::AppError;
use moto_ride::gateway::memory::MemoryGateway;
use moto_ride::gateway::postgrest::PostgrestGateway;
use moto_ride::gateway::Gateway;
use moto_ride::geo::google::GoogleMaps;
use moto_ride::geo::routing::RoutingProvider;
use moto_ride::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let gateway: Arc<dyn Gateway> = if config.backend_configured() {
        tracing::info!(backend_url = %config.backend_url, "using remote backend");
        Arc::new(PostgrestGateway::new(
            &config.backend_url,
            &config.backend_anon_key,
            config.realtime_poll_interval,
        ))
    } else {
        tracing::warn!("backend not configured; running against the in-memory gateway");
        Arc::new(MemoryGateway::seeded(config.event_buffer_size))
    };

    let routing: Option<Arc<dyn RoutingProvider>> = match &config.routing_api_key {
        Some(key) => Some(Arc::new(GoogleMaps::new(
            config.routing_base_url.clone(),
            key.clone(),
            config.routing_language.clone(),
        ))),
        None => {
            tracing::warn!("no routing key; distances are straight-line estimates");
            None
        }
    };

    let http_port = config.http_port;
    let shared_state = Arc::new(AppState::new(config, gateway, routing));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
