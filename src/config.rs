//! Server configuration module
//! Handles dynamic configuration parameters for the hub and its transport

use crate::constants::*;
use crate::core::hub::HubSettings;
use crate::core::poller::PollerSettings;
use crate::core::rate_limiter::{RateLimitSettings, TokenBucketConfig};
use crate::core::session::SessionSettings;
use crate::error::{HubError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret for token signing/validation
    pub jwt_secret: String,
    /// Deadline applied to every transport write, keepalives included
    pub write_wait: Duration,
    /// How long a connection may stay silent before it is considered dead
    pub pong_wait: Duration,
    /// Keepalive probe period, strictly less than `pong_wait`
    pub ping_interval: Duration,
    pub max_message_size: usize,
    pub outbound_queue_capacity: usize,
    pub persistence_queue_capacity: usize,
    /// Shared cap for every room
    pub room_rate_per_sec: f64,
    pub room_burst: u32,
    /// Cap for a single sender
    pub connection_messages_per_minute: u32,
    pub connection_burst: u32,
    /// Number of persisted messages replayed to a joining connection per room
    pub history_limit: usize,
    pub persist_timeout: Duration,
    pub fetch_timeout: Duration,
    pub enable_match_updates: bool,
    pub match_poll_interval: Duration,
    /// TLS configuration
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl ServerConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-jwt-key-only-for-unit-tests-0123456789".to_string(),
            write_wait: Duration::from_secs(DEFAULT_WRITE_WAIT_SECS),
            pong_wait: Duration::from_secs(DEFAULT_PONG_WAIT_SECS),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            persistence_queue_capacity: DEFAULT_PERSISTENCE_QUEUE_CAPACITY,
            room_rate_per_sec: DEFAULT_ROOM_RATE_PER_SEC,
            room_burst: DEFAULT_ROOM_BURST,
            connection_messages_per_minute: DEFAULT_CONNECTION_MESSAGES_PER_MINUTE,
            connection_burst: DEFAULT_CONNECTION_BURST,
            history_limit: DEFAULT_HISTORY_LIMIT,
            persist_timeout: Duration::from_secs(DEFAULT_PERSIST_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            enable_match_updates: false,
            match_poll_interval: Duration::from_secs(DEFAULT_MATCH_POLL_INTERVAL_SECS),
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    /// Validate that a secret meets security requirements
    fn validate_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(HubError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        let insecure_patterns = ["your-secret-key", "change-this", "changeme", "password", "12345"];

        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(HubError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Generate one with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        Self::validate_secret(&self.jwt_secret)?;

        if self.ping_interval >= self.pong_wait {
            return Err(HubError::ConfigError(
                "ping interval must be less than pong wait".to_string(),
            ));
        }
        if self.write_wait.is_zero() {
            return Err(HubError::ConfigError("write wait must be positive".to_string()));
        }
        if !(self.room_rate_per_sec > 0.0) || self.room_burst == 0 {
            return Err(HubError::ConfigError(
                "room rate and burst must be positive".to_string(),
            ));
        }
        if self.connection_messages_per_minute == 0 || self.connection_burst == 0 {
            return Err(HubError::ConfigError(
                "connection rate and burst must be positive".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 || self.persistence_queue_capacity == 0 {
            return Err(HubError::ConfigError(
                "queue capacities must be positive".to_string(),
            ));
        }
        if self.enable_match_updates && self.match_poll_interval.is_zero() {
            return Err(HubError::ConfigError(
                "match poll interval must be positive".to_string(),
            ));
        }
        if self.enable_tls && (self.tls_cert_path.is_none() || self.tls_key_path.is_none()) {
            return Err(HubError::ConfigError(
                "TLS is enabled but MATCHROOM_TLS_CERT_PATH or MATCHROOM_TLS_KEY_PATH is not set"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("MATCHROOM_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                HubError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;

        let config = Self {
            host: env::var("MATCHROOM_HOST").unwrap_or(DEFAULT_HOST.to_string()),
            port: env_or("MATCHROOM_PORT", DEFAULT_PORT),
            jwt_secret,
            write_wait: secs_or("MATCHROOM_WS_WRITE_WAIT", DEFAULT_WRITE_WAIT_SECS),
            pong_wait: secs_or("MATCHROOM_WS_PONG_WAIT", DEFAULT_PONG_WAIT_SECS),
            ping_interval: secs_or("MATCHROOM_WS_PING_PERIOD", DEFAULT_PING_INTERVAL_SECS),
            max_message_size: env_or("MATCHROOM_WS_MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE),
            outbound_queue_capacity: env_or(
                "MATCHROOM_OUTBOUND_QUEUE",
                DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            ),
            persistence_queue_capacity: env_or(
                "MATCHROOM_PERSIST_QUEUE",
                DEFAULT_PERSISTENCE_QUEUE_CAPACITY,
            ),
            room_rate_per_sec: env_or("MATCHROOM_ROOM_RATE", DEFAULT_ROOM_RATE_PER_SEC),
            room_burst: env_or("MATCHROOM_ROOM_BURST", DEFAULT_ROOM_BURST),
            connection_messages_per_minute: env_or(
                "MATCHROOM_RATE_LIMIT_MSG_PER_MIN",
                DEFAULT_CONNECTION_MESSAGES_PER_MINUTE,
            ),
            connection_burst: env_or("MATCHROOM_RATE_LIMIT_BURST", DEFAULT_CONNECTION_BURST),
            history_limit: env_or("MATCHROOM_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT),
            persist_timeout: secs_or("MATCHROOM_PERSIST_TIMEOUT", DEFAULT_PERSIST_TIMEOUT_SECS),
            fetch_timeout: secs_or("MATCHROOM_FETCH_TIMEOUT", DEFAULT_FETCH_TIMEOUT_SECS),
            enable_match_updates: flag_or("MATCHROOM_ENABLE_MATCH_UPDATES", true),
            match_poll_interval: secs_or(
                "MATCHROOM_MATCH_POLL_INTERVAL",
                DEFAULT_MATCH_POLL_INTERVAL_SECS,
            ),
            enable_tls: flag_or("MATCHROOM_ENABLE_TLS", false),
            tls_cert_path: env::var("MATCHROOM_TLS_CERT_PATH").ok(),
            tls_key_path: env::var("MATCHROOM_TLS_KEY_PATH").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            write_wait: self.write_wait,
            pong_wait: self.pong_wait,
            ping_interval: self.ping_interval,
            outbound_queue_capacity: self.outbound_queue_capacity,
        }
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            room: TokenBucketConfig::new(self.room_rate_per_sec, self.room_burst),
            connection: TokenBucketConfig::per_minute(
                self.connection_messages_per_minute,
                self.connection_burst,
            ),
        }
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            room_limit: self.rate_limit_settings().room,
            history_limit: self.history_limit,
            fetch_timeout: self.fetch_timeout,
            persist_timeout: self.persist_timeout,
            persistence_queue_capacity: self.persistence_queue_capacity,
        }
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: self.match_poll_interval,
            fetch_timeout: self.fetch_timeout,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn secs_or(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(key, default_secs))
}

fn flag_or(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_is_valid() {
        let config = ServerConfig::for_testing();
        assert!(config.validate().is_ok());
        assert!(config.ping_interval < config.pong_wait);
    }

    #[test]
    fn test_ping_must_be_shorter_than_pong() {
        let mut config = ServerConfig::for_testing();
        config.ping_interval = config.pong_wait;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ping interval"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = ServerConfig::for_testing();
        config.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rates_rejected() {
        let mut config = ServerConfig::for_testing();
        config.room_burst = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::for_testing();
        config.connection_messages_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tls_requires_paths() {
        let mut config = ServerConfig::for_testing();
        config.enable_tls = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = ServerConfig::for_testing();
        let limits = config.rate_limit_settings();
        assert_eq!(limits.room.burst, DEFAULT_ROOM_BURST);
        assert!((limits.connection.refill_per_sec - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.hub_settings().history_limit, DEFAULT_HISTORY_LIMIT);
    }
}
