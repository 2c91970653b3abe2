//! Bandwagon Hub Library
//!
//! Real-time music playback synchronization hub: rooms of WebSocket clients
//! share one authoritative playback state, a FIFO queue, and enough timing
//! information to compute the same playhead position everywhere.
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod clock;
pub mod server;

pub use server::{make_app, run_server, ServerConfig};
