//! WebSocket infrastructure for real-time room synchronization.

pub mod handler;
pub mod hub;
pub mod messages;
pub mod room;
pub mod session;

pub use hub::RoomHub;
pub use messages::ServerMessage;
