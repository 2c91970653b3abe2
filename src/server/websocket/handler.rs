//! WebSocket route handler.
//!
//! Handles the upgrade, the per-connection message loop, dispatch by message
//! kind, and cleanup on disconnect.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::hub::{Room, RoomHub};
use super::messages::{
    msg_types, AddSongPayload, GetRoomStatePayload, JoinRoomPayload, SeekPayload, ServerMessage,
    ServerPlayPayload, SongChangePayload,
};
use super::session::{mint_session_id, SessionHandle};
use crate::clock;
use crate::server::metrics;
use crate::server::state::{ServerConfig, SharedRoomHub, ShutdownSignal};

/// One connected client: its send handle plus the room it is currently in.
struct ClientSession {
    handle: SessionHandle,
    room: Option<Arc<Room>>,
}

/// WebSocket upgrade handler, mounted at `/`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<SharedRoomHub>,
    State(config): State<ServerConfig>,
    State(shutdown): State<ShutdownSignal>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, config.send_queue_depth, shutdown))
}

/// Handle an established WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<RoomHub>,
    send_queue_depth: usize,
    shutdown: ShutdownSignal,
) {
    let session_id = mint_session_id();
    let (handle, outgoing_rx) = SessionHandle::new(session_id.clone(), send_queue_depth);
    metrics::WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket connected: session {}", session_id);

    let (ws_sink, ws_stream) = socket.split();

    let welcome = ServerMessage::Connected {
        client_id: session_id.clone(),
        server_time: clock::now_ms(),
    };
    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, welcome));

    let mut session = ClientSession { handle, room: None };
    process_incoming(ws_stream, &hub, &mut session, shutdown).await;

    info!("WebSocket disconnected: session {}", session_id);
    outgoing_handle.abort();
    hub.leave_room(&session_id, &mut session.room).await;
    metrics::WS_CONNECTIONS_ACTIVE.dec();
}

/// Forward frames from the session's outbound channel to the socket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<ServerMessage>,
    welcome: ServerMessage,
) {
    if let Ok(json) = serde_json::to_string(&welcome) {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    while let Some(msg) = outgoing_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                error!("Failed to serialize outbound frame: {}", err);
            }
        }
    }
}

/// Read frames off the socket until it closes, errors, or the process
/// begins shutting down.
async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    hub: &Arc<RoomHub>,
    session: &mut ClientSession,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let result = tokio::select! {
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = shutdown.triggered() => {
                debug!("Closing session {} for shutdown", session.handle.id());
                break;
            }
        };
        match result {
            Ok(Message::Text(text)) => {
                dispatch(&text, hub, session).await;
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch(text, hub, session).await,
                Err(_) => {
                    send_error(&session.handle, "Message must be valid UTF-8 text");
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("Received transport-level ping/pong");
            }
            Ok(Message::Close(_)) => {
                debug!("Received close frame from session {}", session.handle.id());
                break;
            }
            Err(err) => {
                debug!("WebSocket error on session {}: {}", session.handle.id(), err);
                break;
            }
        }
    }
}

fn send_error(handle: &SessionHandle, message: impl Into<String>) {
    handle.send(ServerMessage::Error {
        message: message.into(),
        timestamp: clock::now_ms(),
    });
}

/// Decode a payload from the raw frame, answering malformed payloads with an
/// `error` unicast.
fn decode<T: serde::de::DeserializeOwned>(
    frame: &serde_json::Value,
    handle: &SessionHandle,
) -> Option<T> {
    match serde_json::from_value(frame.clone()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            debug!("Failed to decode payload: {}", err);
            send_error(handle, format!("Invalid message format: {}", err));
            None
        }
    }
}

/// Parse a frame and route it by `type`.
///
/// `join_room` and `ping` work from any session. Recognized room-scoped
/// kinds require the session to be in a room and are silently ignored
/// otherwise (a client may race its own `leave_room`); an unrecognized kind
/// is answered with an error regardless of room membership.
async fn dispatch(text: &str, hub: &Arc<RoomHub>, session: &mut ClientSession) {
    let handle = session.handle.clone();

    let frame: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            debug!("Failed to parse frame: {}", err);
            send_error(&handle, format!("Invalid message format: {}", err));
            return;
        }
    };
    if !frame.is_object() {
        send_error(&handle, "Message must be a JSON object");
        return;
    }
    let Some(msg_type) = frame.get("type").and_then(|t| t.as_str()).map(String::from) else {
        send_error(&handle, "Message must carry a string \"type\" field");
        return;
    };
    metrics::record_message_received(&msg_type);

    match msg_type.as_str() {
        msg_types::PING => {
            handle.send(ServerMessage::Pong {
                server_time: clock::now_ms(),
            });
        }
        msg_types::JOIN_ROOM => {
            let Some(payload) = decode::<JoinRoomPayload>(&frame, &handle) else {
                return;
            };
            match payload.room_id.as_deref().filter(|id| !id.is_empty()) {
                Some(room_id) => hub.join_room(&handle, &mut session.room, room_id).await,
                None => send_error(&handle, "join_room requires a roomId"),
            }
        }
        msg_types::LEAVE_ROOM
        | msg_types::PLAY
        | msg_types::PAUSE
        | msg_types::CLIENT_PAUSE
        | msg_types::CLIENT_RESUME
        | msg_types::SERVER_PLAY
        | msg_types::SEEK
        | msg_types::SONG_CHANGE
        | msg_types::ADD_SONG
        | msg_types::PLAYBACK_ENDED
        | msg_types::GET_ROOM_STATE
        | msg_types::SYNC_REQUEST => {
            let Some(room) = session.room.clone() else {
                debug!(
                    "Ignoring {} from session {} outside any room",
                    msg_type,
                    handle.id()
                );
                return;
            };
            dispatch_room_scoped(&msg_type, &frame, hub, &room, session, &handle).await;
        }
        other => {
            send_error(&handle, format!("Unknown message type: {}", other));
        }
    }
}

/// Handle a recognized room-scoped message. The caller has already resolved
/// the session's current room.
async fn dispatch_room_scoped(
    msg_type: &str,
    frame: &serde_json::Value,
    hub: &Arc<RoomHub>,
    room: &Arc<Room>,
    session: &mut ClientSession,
    handle: &SessionHandle,
) {
    match msg_type {
        msg_types::LEAVE_ROOM => {
            hub.leave_room(handle.id(), &mut session.room).await;
        }
        msg_types::PLAY | msg_types::PAUSE | msg_types::CLIENT_RESUME => {
            hub.state_sync(room, handle).await;
        }
        msg_types::CLIENT_PAUSE => {
            handle.send(ServerMessage::ClientPauseAck {
                client_id: handle.id().to_string(),
                timestamp: clock::now_ms(),
            });
        }
        msg_types::SERVER_PLAY => {
            if let Some(payload) = decode::<ServerPlayPayload>(frame, handle) {
                hub.server_play(room, handle.id(), payload.position, payload.song_id)
                    .await;
            }
        }
        msg_types::SEEK => {
            if let Some(payload) = decode::<SeekPayload>(frame, handle) {
                hub.seek(room, handle.id(), payload.position).await;
            }
        }
        msg_types::SONG_CHANGE => {
            if let Some(payload) = decode::<SongChangePayload>(frame, handle) {
                match payload.song {
                    Some(song) => hub.song_change(room, handle.id(), song).await,
                    None => send_error(handle, "song_change requires a song"),
                }
            }
        }
        msg_types::ADD_SONG => {
            if let Some(payload) = decode::<AddSongPayload>(frame, handle) {
                match payload.song {
                    Some(song) => {
                        hub.add_song(room, handle, song, payload.set_as_current)
                            .await
                    }
                    None => send_error(handle, "add_song requires a song"),
                }
            }
        }
        msg_types::PLAYBACK_ENDED => {
            hub.playback_ended(room).await;
        }
        msg_types::GET_ROOM_STATE => {
            if let Some(payload) = decode::<GetRoomStatePayload>(frame, handle) {
                hub.room_state(room, handle, payload.request_id).await;
            }
        }
        msg_types::SYNC_REQUEST => {
            hub.sync_request(room, handle).await;
        }
        _ => {}
    }
}
