// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const WS_PATH: &str = "ws";

// Transport timing (seconds). Ping period must stay below the pong wait.
pub const DEFAULT_WRITE_WAIT_SECS: u64 = 10;
pub const DEFAULT_PONG_WAIT_SECS: u64 = 60;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 54;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

// Queue sizing
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_PERSISTENCE_QUEUE_CAPACITY: usize = 1024;
pub const HUB_CONTROL_CHANNEL_CAPACITY: usize = 64;
pub const HUB_BROADCAST_CHANNEL_CAPACITY: usize = 1;

// Rate limiting
pub const DEFAULT_ROOM_RATE_PER_SEC: f64 = 10.0;
pub const DEFAULT_ROOM_BURST: u32 = 10;
pub const DEFAULT_CONNECTION_MESSAGES_PER_MINUTE: u32 = 60;
pub const DEFAULT_CONNECTION_BURST: u32 = 10;

// Store collaborator
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_PERSIST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

// Match polling
pub const DEFAULT_MATCH_POLL_INTERVAL_SECS: u64 = 30;

// Admission limits
pub const MAX_ROOMS_PER_CONNECTION: usize = 16;
pub const MAX_ROOM_ID_LENGTH: usize = 64;
