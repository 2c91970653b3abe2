//! Per-connection session handle.
//!
//! Each accepted connection gets a freshly minted id and a bounded outbound
//! channel. A dedicated writer task drains the channel onto the socket, so
//! enqueueing from a room critical section never blocks: a congested or
//! closed peer just loses the frame.

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::server::metrics;

/// Mint a server-assigned session identifier.
pub fn mint_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Sending side of one session. Cloned into the member set of the room the
/// session joins.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    tx: mpsc::Sender<ServerMessage>,
}

impl SessionHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn new(id: String, queue_depth: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue a frame for delivery. Never blocks; a full or closed channel
    /// drops the frame with a warning.
    pub fn send(&self, message: ServerMessage) {
        if let Err(err) = self.tx.try_send(message) {
            metrics::SEND_FAILURES_TOTAL.inc();
            warn!("Dropping outbound frame for session {}: {}", self.id, err);
        }
    }
}
