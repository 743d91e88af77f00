//! orchestrator-server: standalone REST server for SCA verification.
//!
//! Reads config from:
//!   ORCHESTRATOR_CONFIG: optional YAML file
//!   ORCHESTRATOR_*     : per-field overrides (see `OrchestratorConfig`)
//!   .env               : loaded first when present

use anyhow::{Context, Result};
use orchestrator_core::OrchestratorConfig;
use orchestrator_server::router::build_router;
use orchestrator_server::state::Services;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orchestrator_core=debug,orchestrator_server=debug".into()),
        )
        .init();

    let config = OrchestratorConfig::load().context("Loading orchestrator config")?;
    tracing::info!(
        waiter_timeout_ms = config.waiter_timeout_ms,
        challenge_ttl_secs = config.challenge_ttl_secs,
        worker_count = config.worker_count,
        registry_shards = config.registry_shards,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let services = Services::build(&config, shutdown_rx)?;
    let app = build_router(services.state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Binding {}", config.bind_addr))?;
    tracing::info!("orchestrator-server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    for task in services.background {
        let _ = task.await;
    }
    tracing::info!("orchestrator-server stopped");
    Ok(())
}
