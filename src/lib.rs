//! Matchroom - real-time chat and live match updates over WebSocket
//!
//! Clients join the rooms of the matches they follow and exchange chat
//! messages. A poller watches the live match feed and pushes score and
//! status changes into the same rooms.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod storage;

// Re-export main components
pub use config::ServerConfig;
pub use constants::*;
pub use error::{HubError, Result};
