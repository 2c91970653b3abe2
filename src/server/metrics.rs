#![allow(dead_code)]

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Once;

use super::websocket::messages::msg_types;

/// Metric name prefix for all Bandwagon metrics
const PREFIX: &str = "bandwagon";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref WS_CONNECTIONS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_ws_connections_active"),
        "Number of open WebSocket sessions"
    ).expect("Failed to create ws_connections_active metric");

    pub static ref ROOMS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_rooms_active"),
        "Number of live rooms"
    ).expect("Failed to create rooms_active metric");

    pub static ref MESSAGES_RECEIVED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_messages_received_total"), "Inbound frames by message type"),
        &["type"]
    ).expect("Failed to create messages_received_total metric");

    pub static ref BROADCASTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_broadcasts_total"), "Room broadcasts by message type"),
        &["type"]
    ).expect("Failed to create broadcasts_total metric");

    pub static ref SEND_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_send_failures_total"),
        "Outbound frames dropped on congested or closed sessions"
    ).expect("Failed to create send_failures_total metric");
}

/// Register all metrics with the global registry. Safe to call more than
/// once; only the first call registers.
pub fn init_metrics() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
            .expect("Failed to register ws_connections_active");
        REGISTRY
            .register(Box::new(ROOMS_ACTIVE.clone()))
            .expect("Failed to register rooms_active");
        REGISTRY
            .register(Box::new(MESSAGES_RECEIVED_TOTAL.clone()))
            .expect("Failed to register messages_received_total");
        REGISTRY
            .register(Box::new(BROADCASTS_TOTAL.clone()))
            .expect("Failed to register broadcasts_total");
        REGISTRY
            .register(Box::new(SEND_FAILURES_TOTAL.clone()))
            .expect("Failed to register send_failures_total");
    });
}

/// Count an inbound frame. Unrecognized kinds share one label so clients
/// cannot inflate the label space.
pub fn record_message_received(msg_type: &str) {
    const KNOWN: &[&str] = &[
        msg_types::PING,
        msg_types::JOIN_ROOM,
        msg_types::LEAVE_ROOM,
        msg_types::PLAY,
        msg_types::PAUSE,
        msg_types::CLIENT_PAUSE,
        msg_types::CLIENT_RESUME,
        msg_types::SERVER_PLAY,
        msg_types::SEEK,
        msg_types::SONG_CHANGE,
        msg_types::ADD_SONG,
        msg_types::PLAYBACK_ENDED,
        msg_types::GET_ROOM_STATE,
        msg_types::SYNC_REQUEST,
    ];
    let label = if KNOWN.contains(&msg_type) {
        msg_type
    } else {
        "unknown"
    };
    MESSAGES_RECEIVED_TOTAL.with_label_values(&[label]).inc();
}

/// `GET /metrics` handler for the Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", err),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn unknown_message_types_share_one_label() {
        record_message_received("definitely-not-a-kind");
        record_message_received("another-bogus-kind");

        let count = MESSAGES_RECEIVED_TOTAL
            .with_label_values(&["unknown"])
            .get();
        assert!(count >= 2.0);
    }
}
