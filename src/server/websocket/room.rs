//! Per-room playback state machine and queue.
//!
//! A room's playback state is authoritative: when a song is playing, the
//! logical playhead is derived from `start_time_ms` against the server clock,
//! so every client that knows the server time computes the same position.
//! All methods take the current timestamp as a parameter; the caller stamps
//! the transition once and reuses the same value in the messages it emits.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// `triggered_by` value for transitions the hub performs itself
/// (queue auto-advance). Session ids are v4 UUIDs, so this can never
/// collide with one.
pub const TRIGGERED_BY_SERVER: &str = "server";

/// A song as supplied by clients. The hub only reads `id` and `title`;
/// every other field is carried verbatim and echoed back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Authoritative playback state of one room.
///
/// Invariants, maintained by the transition methods below:
/// - `is_playing` implies `start_time_ms` and `current_song` are set.
/// - not `is_playing` implies `start_time_ms` is unset.
/// - `position_seconds` is never negative.
/// - `last_updated_ms` never decreases.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_song: Option<Song>,
    #[serde(rename = "position")]
    pub position_seconds: f64,
    #[serde(rename = "startTime")]
    pub start_time_ms: Option<u64>,
    #[serde(rename = "lastUpdated")]
    pub last_updated_ms: u64,
    pub song_id: Option<String>,
    pub triggered_by: Option<String>,
}

impl PlaybackState {
    fn new(now_ms: u64) -> Self {
        Self {
            is_playing: false,
            current_song: None,
            position_seconds: 0.0,
            start_time_ms: None,
            last_updated_ms: now_ms,
            song_id: None,
            triggered_by: None,
        }
    }
}

/// Clamp an inbound position to the valid range. Non-finite values (which
/// lenient decoding should already have mapped to zero) clamp to zero too.
pub fn clamp_position(position: f64) -> f64 {
    if position.is_finite() && position > 0.0 {
        position
    } else {
        0.0
    }
}

fn start_time_for(position_seconds: f64, now_ms: u64) -> u64 {
    now_ms.saturating_sub((position_seconds * 1000.0).round() as u64)
}

/// Playback state plus the FIFO queue of one room. Owned exclusively by the
/// room; all access happens under the room's lock.
#[derive(Debug)]
pub struct RoomState {
    pub playback: PlaybackState,
    pub queue: VecDeque<Song>,
}

impl RoomState {
    pub fn new(now_ms: u64) -> Self {
        Self {
            playback: PlaybackState::new(now_ms),
            queue: VecDeque::new(),
        }
    }

    /// The logical playhead at `now_ms`: derived from the start time while
    /// playing, the stored position otherwise.
    pub fn derived_position(&self, now_ms: u64) -> f64 {
        match (self.playback.is_playing, self.playback.start_time_ms) {
            (true, Some(start)) => now_ms.saturating_sub(start) as f64 / 1000.0,
            _ => self.playback.position_seconds,
        }
    }

    /// A copy of the playback state with `position` replaced by the derived
    /// playhead, for `*_sync` replies.
    pub fn snapshot(&self, now_ms: u64) -> PlaybackState {
        let mut state = self.playback.clone();
        state.position_seconds = self.derived_position(now_ms);
        state
    }

    /// Start playing `song` from position zero. Used by `song_change`,
    /// by `add_song` when the song becomes current, and by auto-advance.
    pub fn play_song(&mut self, song: Song, now_ms: u64, triggered_by: &str) {
        self.playback.song_id = song.id.clone();
        self.playback.current_song = Some(song);
        self.playback.position_seconds = 0.0;
        self.playback.start_time_ms = Some(now_ms);
        self.playback.is_playing = true;
        self.playback.last_updated_ms = now_ms;
        self.playback.triggered_by = Some(triggered_by.to_string());
    }

    /// Apply a `server_play`: resume playing from a client-reported position.
    /// Returns the recomputed start time, or `None` when no song is loaded
    /// (playing without a current song would break the state invariants).
    ///
    /// This is the single seam where an authorization check on the
    /// client-supplied position would go.
    pub fn apply_server_play(
        &mut self,
        position: f64,
        song_id: Option<String>,
        now_ms: u64,
        triggered_by: &str,
    ) -> Option<u64> {
        self.playback.current_song.as_ref()?;
        let position = clamp_position(position);
        let start = start_time_for(position, now_ms);
        self.playback.is_playing = true;
        self.playback.position_seconds = position;
        self.playback.start_time_ms = Some(start);
        if song_id.is_some() {
            self.playback.song_id = song_id;
        }
        self.playback.last_updated_ms = now_ms;
        self.playback.triggered_by = Some(triggered_by.to_string());
        Some(start)
    }

    /// Seek to `position`, preserving the playing/paused state. While playing
    /// the start time is recomputed so the derived playhead lands on the
    /// target; while paused the start time stays unset.
    pub fn seek_to(&mut self, position: f64, now_ms: u64, triggered_by: &str) {
        let position = clamp_position(position);
        self.playback.position_seconds = position;
        self.playback.start_time_ms = if self.playback.is_playing {
            Some(start_time_for(position, now_ms))
        } else {
            None
        };
        self.playback.last_updated_ms = now_ms;
        self.playback.triggered_by = Some(triggered_by.to_string());
    }

    /// Handle end of playback: start the queue head if there is one,
    /// otherwise fall back to idle.
    pub fn advance(&mut self, now_ms: u64) -> Option<Song> {
        match self.queue.pop_front() {
            Some(next) => {
                self.play_song(next.clone(), now_ms, TRIGGERED_BY_SERVER);
                Some(next)
            }
            None => {
                self.playback.is_playing = false;
                self.playback.current_song = None;
                self.playback.position_seconds = 0.0;
                self.playback.start_time_ms = None;
                self.playback.last_updated_ms = now_ms;
                self.playback.triggered_by = Some(TRIGGERED_BY_SERVER.to_string());
                None
            }
        }
    }

    /// Append a song to the queue tail. Returns the queue length after the
    /// append.
    pub fn enqueue(&mut self, song: Song) -> usize {
        self.queue.push_back(song);
        self.queue.len()
    }
}
