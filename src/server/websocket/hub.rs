//! Room registry and room-scoped message handling.
//!
//! The unit of serialization is the room: every read or mutation of a room's
//! playback state, queue or member set happens under that room's lock, so
//! handlers for the same room observe a serial history. The registry has its
//! own lock, taken only for get-or-create and empty-room cleanup, and is
//! never held across a room handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::room::{RoomState, Song};
use super::session::SessionHandle;
use crate::clock;
use crate::server::metrics;

/// One room: identity plus the lock-guarded state and member set.
pub struct Room {
    id: String,
    created_at_ms: u64,
    /// Mirrors `inner.members.len()`, maintained under the room lock.
    /// Lets cleanup decide without taking the room lock under the registry
    /// lock.
    member_count: AtomicUsize,
    inner: Mutex<RoomInner>,
}

struct RoomInner {
    state: RoomState,
    members: HashMap<String, SessionHandle>,
}

impl Room {
    fn new(id: String, now_ms: u64) -> Self {
        Self {
            id,
            created_at_ms: now_ms,
            member_count: AtomicUsize::new(0),
            inner: Mutex::new(RoomInner {
                state: RoomState::new(now_ms),
                members: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Deliver a message to every member except `exclude`. A member whose send
/// side is congested or closed just loses the frame; delivery to the others
/// proceeds.
fn broadcast(
    members: &HashMap<String, SessionHandle>,
    message: &ServerMessage,
    exclude: Option<&str>,
) {
    metrics::BROADCASTS_TOTAL
        .with_label_values(&[message.kind()])
        .inc();
    for (member_id, member) in members {
        if exclude == Some(member_id.as_str()) {
            continue;
        }
        member.send(message.clone());
    }
}

/// Registry of live rooms plus the handlers for every room-scoped message.
pub struct RoomHub {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_create(&self, room_id: &str, now_ms: u64) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }
        info!("Room {} created", room_id);
        metrics::ROOMS_ACTIVE.inc();
        let room = Arc::new(Room::new(room_id.to_string(), now_ms));
        rooms.insert(room_id.to_string(), room.clone());
        room
    }

    /// Remove `room` from the registry if it is still registered and has no
    /// members. The pointer comparison guards against removing a fresh room
    /// that reused the id while we were between locks.
    async fn drop_if_empty(&self, room: &Arc<Room>) {
        let mut rooms = self.rooms.lock().await;
        let still_registered = rooms
            .get(room.id())
            .map(|registered| Arc::ptr_eq(registered, room))
            .unwrap_or(false);
        if still_registered && room.member_count.load(Ordering::SeqCst) == 0 {
            rooms.remove(room.id());
            metrics::ROOMS_ACTIVE.dec();
            info!(
                "Room {} destroyed after {}ms",
                room.id(),
                clock::now_ms().saturating_sub(room.created_at_ms)
            );
        }
    }

    /// Number of live rooms (metrics and tests).
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Join `room_id`, detaching from the current room first. The joiner
    /// receives `room_joined` followed by `server_state_sync`; everyone else
    /// in the target room receives `client_joined`.
    pub async fn join_room(
        &self,
        handle: &SessionHandle,
        current: &mut Option<Arc<Room>>,
        room_id: &str,
    ) {
        self.leave_room(handle.id(), current).await;

        let now = clock::now_ms();
        let room = self.get_or_create(room_id, now).await;
        {
            let mut inner = room.inner.lock().await;
            inner.members.insert(handle.id().to_string(), handle.clone());
            room.member_count.store(inner.members.len(), Ordering::SeqCst);
            let client_count = inner.members.len();

            broadcast(
                &inner.members,
                &ServerMessage::ClientJoined {
                    client_id: handle.id().to_string(),
                    client_count,
                },
                Some(handle.id()),
            );
            handle.send(ServerMessage::RoomJoined {
                room_id: room.id().to_string(),
                playback_state: inner.state.playback.clone(),
                client_count,
            });
            handle.send(ServerMessage::ServerStateSync {
                playback_state: inner.state.snapshot(now),
                server_time: now,
                is_server_playing: inner.state.playback.is_playing,
            });
        }
        debug!("Session {} joined room {}", handle.id(), room_id);
        *current = Some(room);
    }

    /// Detach the session from its current room, if any. Used by
    /// `leave_room` and by the disconnect path; `Option::take` makes the
    /// removal exactly-once. The room's playback state is not touched.
    pub async fn leave_room(&self, session_id: &str, current: &mut Option<Arc<Room>>) {
        let Some(room) = current.take() else {
            return;
        };
        let remaining = {
            let mut inner = room.inner.lock().await;
            if inner.members.remove(session_id).is_none() {
                return;
            }
            room.member_count.store(inner.members.len(), Ordering::SeqCst);
            let remaining = inner.members.len();
            if remaining > 0 {
                broadcast(
                    &inner.members,
                    &ServerMessage::ClientLeft {
                        client_id: session_id.to_string(),
                        client_count: remaining,
                    },
                    None,
                );
            }
            remaining
        };
        debug!("Session {} left room {}", session_id, room.id());
        if remaining == 0 {
            self.drop_if_empty(&room).await;
        }
    }

    /// Reply to `play` / `pause` / `client_resume` with a state snapshot
    /// carrying the derived playhead, so a resuming client lands on the
    /// logical position even if its stored one is stale.
    pub async fn state_sync(&self, room: &Arc<Room>, handle: &SessionHandle) {
        let now = clock::now_ms();
        let inner = room.inner.lock().await;
        handle.send(ServerMessage::ServerStateSync {
            playback_state: inner.state.snapshot(now),
            server_time: now,
            is_server_playing: inner.state.playback.is_playing,
        });
    }

    /// Apply a `server_play` and broadcast the new timing to the whole room,
    /// originator included. Ignored when no song is loaded.
    pub async fn server_play(
        &self,
        room: &Arc<Room>,
        session_id: &str,
        position: f64,
        song_id: Option<String>,
    ) {
        let now = clock::now_ms();
        let mut inner = room.inner.lock().await;
        let Some(start_time) = inner
            .state
            .apply_server_play(position, song_id, now, session_id)
        else {
            debug!("server_play ignored in room {}: no song loaded", room.id());
            return;
        };
        let message = ServerMessage::ServerPlaySync {
            position: inner.state.playback.position_seconds,
            server_time: now,
            start_time,
            song_id: inner.state.playback.song_id.clone(),
            triggered_by: session_id.to_string(),
        };
        broadcast(&inner.members, &message, None);
    }

    /// Apply a `seek` and broadcast the resulting timing to the whole room.
    pub async fn seek(&self, room: &Arc<Room>, session_id: &str, position: f64) {
        let now = clock::now_ms();
        let mut inner = room.inner.lock().await;
        inner.state.seek_to(position, now, session_id);
        let message = ServerMessage::SeekSync {
            position: inner.state.playback.position_seconds,
            is_playing: inner.state.playback.is_playing,
            server_time: now,
            start_time: inner.state.playback.start_time_ms,
            triggered_by: session_id.to_string(),
        };
        broadcast(&inner.members, &message, None);
    }

    /// Swap the current song and start it from zero.
    pub async fn song_change(&self, room: &Arc<Room>, session_id: &str, song: Song) {
        let now = clock::now_ms();
        let mut inner = room.inner.lock().await;
        inner.state.play_song(song.clone(), now, session_id);
        let message = ServerMessage::SongChangeSync {
            song,
            server_time: now,
            start_time: now,
            triggered_by: session_id.to_string(),
        };
        broadcast(&inner.members, &message, None);
    }

    /// Add a song: promoted to current when the room has no current song or
    /// the caller asked for it, queued at the tail otherwise. The originator
    /// always gets `song_added_response`; a promotion additionally notifies
    /// the whole room.
    pub async fn add_song(
        &self,
        room: &Arc<Room>,
        handle: &SessionHandle,
        song: Song,
        set_as_current: bool,
    ) {
        let now = clock::now_ms();
        let mut inner = room.inner.lock().await;
        let was_idle = inner.state.playback.current_song.is_none();
        if was_idle || set_as_current {
            inner.state.play_song(song.clone(), now, handle.id());
            handle.send(ServerMessage::SongAddedResponse {
                success: true,
                song: song.clone(),
                set_as_current: true,
                queue_length: inner.state.queue.len(),
            });
            broadcast(
                &inner.members,
                &ServerMessage::NewSongNotification {
                    song,
                    start_time: now,
                    server_time: now,
                    was_idle: Some(was_idle),
                },
                None,
            );
        } else {
            let queue_length = inner.state.enqueue(song.clone());
            handle.send(ServerMessage::SongAddedResponse {
                success: true,
                song,
                set_as_current: false,
                queue_length,
            });
        }
    }

    /// A client reported the current song finished. Auto-advance to the
    /// queue head, or fall back to idle quietly when the queue is empty.
    pub async fn playback_ended(&self, room: &Arc<Room>) {
        let now = clock::now_ms();
        let mut inner = room.inner.lock().await;
        match inner.state.advance(now) {
            Some(next) => {
                broadcast(
                    &inner.members,
                    &ServerMessage::NewSongNotification {
                        song: next,
                        start_time: now,
                        server_time: now,
                        was_idle: None,
                    },
                    None,
                );
            }
            None => {
                debug!("Room {} playback ended with empty queue, idling", room.id());
            }
        }
    }

    /// Reply to `get_room_state` with the full state, queue included.
    pub async fn room_state(
        &self,
        room: &Arc<Room>,
        handle: &SessionHandle,
        request_id: Option<serde_json::Value>,
    ) {
        let now = clock::now_ms();
        let inner = room.inner.lock().await;
        handle.send(ServerMessage::RoomStateResponse {
            playback_state: inner.state.snapshot(now),
            queue: inner.state.queue.iter().cloned().collect(),
            request_id,
            server_time: now,
        });
    }

    /// Reply to `sync_request` with a timing snapshot.
    pub async fn sync_request(&self, room: &Arc<Room>, handle: &SessionHandle) {
        let now = clock::now_ms();
        let inner = room.inner.lock().await;
        handle.send(ServerMessage::SyncResponse {
            playback_state: inner.state.snapshot(now),
            server_time: now,
        });
    }
}
