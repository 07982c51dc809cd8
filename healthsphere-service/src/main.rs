use healthsphere_service::{ServiceConfig, create_app, telemetry};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading LOG_FORMAT / RUST_LOG
    let config = ServiceConfig::load();
    telemetry::init_tracing();

    info!(config = ?config, "Configuration loaded");

    let app = create_app(&config);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("HealthSphere service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Report analysis endpoint: POST http://{}/report/analyze", addr);
    info!("Chat endpoint: POST http://{}/chat/sessions", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
