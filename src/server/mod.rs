pub mod config;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod server;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{make_app, run_server};
