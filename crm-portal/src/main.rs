use crm_core::observability::init_tracing;
use crm_portal::config::get_configuration;
use crm_portal::startup::build_router;
use crm_portal::AppState;
use dotenvy::dotenv;
use std::time::Duration;
use tracing::info;

const CLIENT_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    let observability = &configuration.observability;
    init_tracing(
        &observability.service_name,
        &observability.log_level,
        observability.otlp_endpoint.as_deref(),
    )?;

    crm_portal::services::metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;

    let state = AppState::from_settings(&configuration);
    state.api_clients.clone().spawn_pruner(CLIENT_PRUNE_INTERVAL);
    let app = build_router(state, configuration.server.secure_cookies);

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!(
        backend = %configuration.backend.url,
        api = %configuration.api.base_url,
        "Starting crm-portal on {}",
        address
    );
    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
