//! Vehicle Sync Server - authoritative synchronization core
//!
//! Runs the fixed-tick snapshot/sweep loop, forwards violations to the
//! sanction engine and serves the health and moderation endpoints.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vehicle_sync_server::app::AppState;
use vehicle_sync_server::config::{Config, LogFormat};
use vehicle_sync_server::http::build_router;
use vehicle_sync_server::sanction::SanctionForwarder;
use vehicle_sync_server::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    // World time starts at zero here
    init_server_time();

    info!("Starting Vehicle Sync Server");
    info!("Server address: {}", config.server_addr);

    // Create application state
    let state = AppState::new(config.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn the tick loop
    let session = state.session.clone();
    let session_task = tokio::spawn(session.run(shutdown_rx.clone()));

    // Spawn sanction forwarding
    let forwarder_task = match &config.sanction {
        Some(sanction) => {
            let forwarder = SanctionForwarder::new(sanction);
            let events = state.telemetry.subscribe();
            Some(tokio::spawn(forwarder.run(events, shutdown_rx.clone())))
        }
        None => {
            info!("SANCTION_WEBHOOK_URL not set, violations stay local");
            None
        }
    };

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background tasks
    let _ = shutdown_tx.send(true);
    session_task.await?;
    if let Some(task) = forwarder_task {
        task.await?;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
