//! Wire protocol types.
//!
//! Every frame in both directions is a flat JSON object with a required
//! string field `type`; all other fields sit beside it in camelCase.
//! Inbound frames are decoded per kind with [`serde_json::from_value`] so the
//! dispatcher can answer unknown kinds with a targeted error. Numeric fields
//! are decoded leniently: missing or non-numeric values read as zero.

use serde::{Deserialize, Deserializer, Serialize};

use super::room::{PlaybackState, Song};

/// Inbound message kind constants.
pub mod msg_types {
    pub const PING: &str = "ping";
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const CLIENT_PAUSE: &str = "client_pause";
    pub const CLIENT_RESUME: &str = "client_resume";
    pub const SERVER_PLAY: &str = "server_play";
    pub const SEEK: &str = "seek";
    pub const SONG_CHANGE: &str = "song_change";
    pub const ADD_SONG: &str = "add_song";
    pub const PLAYBACK_ENDED: &str = "playback_ended";
    pub const GET_ROOM_STATE: &str = "get_room_state";
    pub const SYNC_REQUEST: &str = "sync_request";
}

/// Decode a numeric field leniently: absent or non-numeric values become 0.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(0.0))
}

// ============================================================================
// Client -> Server payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPlayPayload {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub position: f64,
    #[serde(default)]
    pub song_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekPayload {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub position: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongChangePayload {
    #[serde(default)]
    pub song: Option<Song>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSongPayload {
    #[serde(default)]
    pub song: Option<Song>,
    #[serde(default)]
    pub set_as_current: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRoomStatePayload {
    /// Echoed back verbatim in the response.
    #[serde(default)]
    pub request_id: Option<serde_json::Value>,
}

// ============================================================================
// Server -> Client messages
// ============================================================================

/// Every outbound frame. Serializes flat with the variant name as `type`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Welcome frame sent immediately after the connection is accepted.
    Connected { client_id: String, server_time: u64 },
    Error {
        message: String,
        timestamp: u64,
    },
    Pong {
        server_time: u64,
    },
    RoomJoined {
        room_id: String,
        playback_state: PlaybackState,
        client_count: usize,
    },
    ClientJoined {
        client_id: String,
        client_count: usize,
    },
    ClientLeft {
        client_id: String,
        client_count: usize,
    },
    /// Full state snapshot with the derived playhead position.
    ServerStateSync {
        playback_state: PlaybackState,
        server_time: u64,
        is_server_playing: bool,
    },
    ServerPlaySync {
        position: f64,
        server_time: u64,
        start_time: u64,
        song_id: Option<String>,
        triggered_by: String,
    },
    SeekSync {
        position: f64,
        is_playing: bool,
        server_time: u64,
        start_time: Option<u64>,
        triggered_by: String,
    },
    SongChangeSync {
        song: Song,
        server_time: u64,
        start_time: u64,
        triggered_by: String,
    },
    NewSongNotification {
        song: Song,
        start_time: u64,
        server_time: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        was_idle: Option<bool>,
    },
    ClientPauseAck {
        client_id: String,
        timestamp: u64,
    },
    SyncResponse {
        playback_state: PlaybackState,
        server_time: u64,
    },
    RoomStateResponse {
        playback_state: PlaybackState,
        queue: Vec<Song>,
        request_id: Option<serde_json::Value>,
        server_time: u64,
    },
    SongAddedResponse {
        success: bool,
        song: Song,
        set_as_current: bool,
        queue_length: usize,
    },
}

impl ServerMessage {
    /// The wire `type` tag, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::RoomJoined { .. } => "room_joined",
            ServerMessage::ClientJoined { .. } => "client_joined",
            ServerMessage::ClientLeft { .. } => "client_left",
            ServerMessage::ServerStateSync { .. } => "server_state_sync",
            ServerMessage::ServerPlaySync { .. } => "server_play_sync",
            ServerMessage::SeekSync { .. } => "seek_sync",
            ServerMessage::SongChangeSync { .. } => "song_change_sync",
            ServerMessage::NewSongNotification { .. } => "new_song_notification",
            ServerMessage::ClientPauseAck { .. } => "client_pause_ack",
            ServerMessage::SyncResponse { .. } => "sync_response",
            ServerMessage::RoomStateResponse { .. } => "room_state_response",
            ServerMessage::SongAddedResponse { .. } => "song_added_response",
        }
    }
}
