use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum HubError {
    // Connection errors
    ConnectionClosed,
    QueueFull,

    // Storage errors
    StorageError(String),
    StorageTimeout(&'static str),

    // Message errors
    SerializationError(String),

    // Room errors
    InvalidRoom(String),

    // Auth errors
    AuthError(String),
    TokenExpired,

    // Hub errors
    HubUnavailable,

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::QueueFull => write!(f, "Outbound queue is full"),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::StorageTimeout(op) => write!(f, "Storage operation timed out: {}", op),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::InvalidRoom(msg) => write!(f, "Invalid room: {}", msg),
            Self::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            Self::TokenExpired => write!(f, "Token expired"),
            Self::HubUnavailable => write!(f, "Hub is not running"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for HubError {}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::SerializationError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for HubError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => HubError::TokenExpired,
            _ => HubError::AuthError(format!("Invalid token: {}", err)),
        }
    }
}

// Generic result type for the hub
pub type Result<T> = std::result::Result<T, HubError>;
