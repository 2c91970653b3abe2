//! WebSocket test client.
//!
//! Thin wrapper over tokio-tungstenite that speaks the hub's flat JSON frame
//! protocol and offers helpers to wait for (or rule out) specific message
//! types.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::server::TestServer;

pub struct WsClient {
    /// The server-assigned session id from the `connected` welcome.
    pub client_id: String,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect and consume the `connected` welcome frame.
    pub async fn connect(server: &TestServer) -> Self {
        let url = format!("{}/", server.base_url);
        let (mut ws, _) = connect_async(&url)
            .await
            .expect("Failed to connect to WebSocket");

        let welcome = next_json(&mut ws, Duration::from_secs(5))
            .await
            .expect("Should receive connected welcome");
        assert_eq!(welcome["type"], "connected");
        assert!(welcome["serverTime"].as_u64().unwrap() > 0);
        let client_id = welcome["clientId"]
            .as_str()
            .expect("connected must carry clientId")
            .to_string();

        Self { client_id, ws }
    }

    /// Send a JSON frame.
    pub async fn send(&mut self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    /// Send a raw text frame (for malformed-payload tests).
    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    /// Next text frame parsed as JSON, or `None` on timeout.
    pub async fn next_message(&mut self, timeout_duration: Duration) -> Option<Value> {
        next_json(&mut self.ws, timeout_duration).await
    }

    /// Wait for a frame of the given type, skipping others.
    pub async fn wait_for_type(&mut self, expected_type: &str, timeout_duration: Duration) -> Option<Value> {
        let result = timeout(timeout_duration, async {
            while let Some(frame) = next_json(&mut self.ws, Duration::from_secs(5)).await {
                if frame["type"] == expected_type {
                    return Some(frame);
                }
            }
            None
        })
        .await;
        result.ok().flatten()
    }

    /// Assert that no frame at all arrives within the window.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Some(frame) = self.next_message(window).await {
            panic!("Expected silence but received: {}", frame);
        }
    }

    /// Join a room and consume the `room_joined` + `server_state_sync`
    /// welcome pair. Returns the `room_joined` frame.
    pub async fn join(&mut self, room_id: &str) -> Value {
        self.send(json!({"type": "join_room", "roomId": room_id}))
            .await;
        let joined = self
            .wait_for_type("room_joined", Duration::from_secs(5))
            .await
            .expect("Should receive room_joined");
        assert_eq!(joined["roomId"], room_id);
        self.wait_for_type("server_state_sync", Duration::from_secs(5))
            .await
            .expect("Should receive server_state_sync after joining");
        joined
    }

    pub async fn close(mut self) {
        self.ws.close(None).await.ok();
    }
}

async fn next_json(
    ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    timeout_duration: Duration,
) -> Option<Value> {
    let result = timeout(timeout_duration, async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if let Ok(json) = serde_json::from_str::<Value>(&text) {
                    return Some(json);
                }
            }
        }
        None
    })
    .await;
    result.ok().flatten()
}
