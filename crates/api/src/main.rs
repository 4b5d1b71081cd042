use std::sync::Arc;

use anyhow::Context;

use jobtrack_api::{app, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobtrack_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(app::build_services(&config).context("failed to open job store")?);
    let router = app::build_app(services.clone(), &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, store = services.backend(), "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    tokio::task::spawn_blocking(move || services.shutdown()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
