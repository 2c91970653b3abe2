//! Router assembly and server lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{any, get},
    Router,
};
use tracing::info;

use super::metrics;
use super::state::{ServerState, ShutdownSignal};
use super::websocket::{handler::ws_handler, RoomHub};
use super::ServerConfig;

/// Build the application router. The WebSocket endpoint negotiates no path,
/// so the upgrade handler answers `/` and every other path.
pub fn make_app(config: ServerConfig, hub: Arc<RoomHub>, shutdown: ShutdownSignal) -> Router {
    let state = ServerState {
        config,
        hub,
        shutdown,
    };

    Router::new()
        .route("/", any(ws_handler))
        .fallback(ws_handler)
        .with_state(state)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Resolve when the process receives a termination signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Termination signal received, shutting down");
}

/// Bind the configured ports and serve until a termination signal arrives.
/// The signal stops the accept loop and closes every open session; in-flight
/// handlers finish before the listener exits. A bind failure is fatal and
/// propagates out as an error.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    metrics::init_metrics();

    let hub = Arc::new(RoomHub::new());
    let (shutdown_tx, shutdown) = ShutdownSignal::new();
    let app = make_app(config.clone(), hub, shutdown);

    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", config.metrics_port))?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            tracing::error!("Metrics server failed: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!("Listening for WebSocket connections on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
