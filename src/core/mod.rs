//! Core of the match room hub

pub mod connection;
pub mod hub;
pub mod message;
pub mod persistence;
pub mod poller;
pub mod rate_limiter;
pub mod room;
pub mod session;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionId, OutboundQueue};
pub use hub::{Hub, HubHandle, HubSettings};
pub use message::{ChatEvent, InboundMessage, MessageKind};
pub use poller::{MatchCache, MatchUpdatePoller, PollerSettings};
pub use rate_limiter::{RateLimitSettings, RateLimiter, TokenBucketConfig};
pub use room::RoomIndex;
pub use session::SessionSettings;
