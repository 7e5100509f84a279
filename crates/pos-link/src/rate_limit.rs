//! Request rate limiting
//!
//! A fixed-window counter per request channel name (`pos-transaction`,
//! `pos-health`, ...). It sits in front of the coordinator and knows
//! nothing about transaction state.
//!
//! The limiter is shared between cloned service handles, so the state is
//! behind a `Mutex`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::LinkError;

/// Request channel for payment submissions
pub const TRANSACTION_CHANNEL: &str = "pos-transaction";
/// Request channel for health checks
pub const HEALTH_CHANNEL: &str = "pos-health";
/// Request channel for port listing
pub const PORTS_CHANNEL: &str = "get-serial-ports";

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window rate limiter keyed by channel name
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request on `channel`, failing if the window is full
    pub fn check(&self, channel: &str) -> Result<(), LinkError> {
        self.check_at(channel, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading
    pub fn check_at(&self, channel: &str, now: Instant) -> Result<(), LinkError> {
        let window_len = Duration::from_millis(self.config.window_ms);
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let window = windows.entry(channel.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window_len,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + window_len;
        }

        if window.count >= self.config.max_requests {
            warn!(
                channel,
                requests = window.count,
                max = self.config.max_requests,
                "rate limit exceeded"
            );
            return Err(LinkError::RateLimited {
                channel: channel.to_string(),
            });
        }

        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_ms: 1000,
        })
    }

    #[test]
    fn test_limit_within_window() {
        let limiter = limiter(10);
        let start = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at(TRANSACTION_CHANNEL, start).is_ok());
        }
        assert_eq!(
            limiter.check_at(TRANSACTION_CHANNEL, start + Duration::from_millis(999)),
            Err(LinkError::RateLimited {
                channel: TRANSACTION_CHANNEL.into()
            })
        );
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(2);
        let start = Instant::now();
        assert!(limiter.check_at(HEALTH_CHANNEL, start).is_ok());
        assert!(limiter.check_at(HEALTH_CHANNEL, start).is_ok());
        assert!(limiter.check_at(HEALTH_CHANNEL, start).is_err());

        let later = start + Duration::from_millis(1000);
        assert!(limiter.check_at(HEALTH_CHANNEL, later).is_ok());
    }

    #[test]
    fn test_channels_are_independent() {
        let limiter = limiter(1);
        let now = Instant::now();
        assert!(limiter.check_at(TRANSACTION_CHANNEL, now).is_ok());
        assert!(limiter.check_at(TRANSACTION_CHANNEL, now).is_err());
        assert!(limiter.check_at(PORTS_CHANNEL, now).is_ok());
    }
}
