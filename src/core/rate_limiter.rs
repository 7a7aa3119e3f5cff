//! Token bucket rate limiting for rooms and senders
//!
//! Tokens refill continuously at a fixed rate up to the burst capacity and
//! each admitted message costs one token. The bucket starts full, so a quiet
//! room or sender can always absorb a full burst.

use std::sync::Mutex;
use std::time::Instant;

/// Refill rate and burst capacity of a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketConfig {
    pub refill_per_sec: f64,
    pub burst: u32,
}

impl TokenBucketConfig {
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        Self {
            refill_per_sec,
            burst,
        }
    }

    pub fn per_minute(messages_per_minute: u32, burst: u32) -> Self {
        Self::new(f64::from(messages_per_minute) / 60.0, burst)
    }
}

/// Limits for both scopes
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Shared cap for every message fanned out to a room
    pub room: TokenBucketConfig,
    /// Cap for a single sender, applied on ingress only
    pub connection: TokenBucketConfig,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Non-blocking token bucket shared across tasks
#[derive(Debug)]
pub struct RateLimiter {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Try to take one token
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        // The guarded section never panics, a poisoned lock still holds valid state
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = now.saturating_duration_since(state.last_refill);
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.config.refill_per_sec)
            .min(f64::from(self.config.burst));

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_initial_burst() {
        let limiter = RateLimiter::new(TokenBucketConfig::new(10.0, 5));
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.allow_at(now));
        }
        assert!(!limiter.allow_at(now));
    }

    #[test]
    fn test_refill_over_time() {
        let limiter = RateLimiter::new(TokenBucketConfig::new(10.0, 5));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.allow_at(start);
        }
        assert!(!limiter.allow_at(start));

        // 200ms at 10 tokens/s refills two tokens
        let later = start + Duration::from_millis(200);
        assert!(limiter.allow_at(later));
        assert!(limiter.allow_at(later));
        assert!(!limiter.allow_at(later));
    }

    #[test]
    fn test_refill_never_exceeds_burst() {
        let limiter = RateLimiter::new(TokenBucketConfig::new(100.0, 3));
        let start = Instant::now();
        let much_later = start + Duration::from_secs(60);
        let allowed = (0..10).filter(|_| limiter.allow_at(much_later)).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn test_per_minute_config() {
        let config = TokenBucketConfig::per_minute(120, 4);
        assert!((config.refill_per_sec - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.burst, 4);
    }

    #[test]
    fn test_concurrent_allow_respects_burst() {
        let limiter = Arc::new(RateLimiter::new(TokenBucketConfig::new(0.001, 20)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..10).filter(|_| limiter.allow()).count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 20);
    }
}
