//! Test server lifecycle management
//!
//! Each test gets an isolated hub bound to a random port. When dropped, the
//! server gracefully shuts down.

use std::sync::Arc;

use bandwagon_hub::server::state::ShutdownSignal;
use bandwagon_hub::server::websocket::RoomHub;
use bandwagon_hub::server::{make_app, ServerConfig};
use tokio::net::TcpListener;

pub struct TestServer {
    /// Base URL for WebSocket connections (e.g. "ws://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    // Signalling shutdown closes every open session and stops the listener
    _shutdown_tx: Option<tokio::sync::watch::Sender<bool>>,
}

impl TestServer {
    /// Spawns a new test server on a random port.
    pub async fn spawn() -> Self {
        let config = ServerConfig {
            send_queue_depth: 32,
            ..ServerConfig::default()
        };
        let hub = Arc::new(RoomHub::new());
        let (shutdown_tx, shutdown) = ShutdownSignal::new();
        let app = make_app(config, hub, shutdown);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let mut serve_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    serve_shutdown.changed().await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("ws://127.0.0.1:{}", port),
            port,
            _shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}
