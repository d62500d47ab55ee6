use doc_enricher::api::{create_router, AppState};
use doc_enricher::infrastructure::{logging, AppConfig, Services};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init(&config.log_filter("api"));

    let services = Services::build(&config)?;
    info!(paperless = %config.paperless.base_url, "services initialized");

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = create_router(AppState::new(services, config, shutdown_rx));

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
