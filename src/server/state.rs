use axum::extract::FromRef;
use std::sync::Arc;
use tokio::sync::watch;

use super::websocket::RoomHub;
pub use super::ServerConfig;

pub type SharedRoomHub = Arc<RoomHub>;

/// Observer side of the process shutdown flag. Every session's read loop
/// watches this and closes when shutdown begins, which lets the listener's
/// graceful shutdown drain.
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// Wait until shutdown is signalled. A dropped sender counts as
    /// shutdown.
    pub async fn triggered(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub hub: SharedRoomHub,
    pub shutdown: ShutdownSignal,
}

impl FromRef<ServerState> for SharedRoomHub {
    fn from_ref(input: &ServerState) -> Self {
        input.hub.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for ShutdownSignal {
    fn from_ref(input: &ServerState) -> Self {
        input.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn triggered_resolves_after_send() {
        let (tx, mut signal) = ShutdownSignal::new();
        tx.send(true).unwrap();
        signal.triggered().await;
    }

    #[tokio::test]
    async fn triggered_resolves_when_sender_dropped() {
        let (tx, mut signal) = ShutdownSignal::new();
        drop(tx);
        signal.triggered().await;
    }
}
