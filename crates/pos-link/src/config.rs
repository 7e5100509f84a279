//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::router::Route;

/// Default baud rate for serial terminals
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Timeouts, limits and queue sizes for the coordinator
///
/// Hardware and simulator windows are separate because the simulator
/// waits on a human operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Response window for serial transactions
    pub transaction_timeout_ms: u64,
    /// Response window for simulator transactions
    pub simulator_timeout_ms: u64,
    /// Response window for health checks
    pub health_timeout_ms: u64,
    /// Upper bound on a single line write
    pub write_timeout_ms: u64,
    /// Baud rate used when none is given
    pub baud_rate: u32,
    /// Capacity of the coordinator command queue
    pub queue_size: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    pub rate_limit: RateLimitConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: 30_000,
            simulator_timeout_ms: 35_000,
            health_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            baud_rate: DEFAULT_BAUD_RATE,
            queue_size: 256,
            event_capacity: 256,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Response window for a transaction on the given route
    pub fn transaction_timeout(&self, route: Route) -> Duration {
        match route {
            Route::Serial => Duration::from_millis(self.transaction_timeout_ms),
            Route::Simulator => Duration::from_millis(self.simulator_timeout_ms),
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Fixed-window request limit applied per request channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 1000,
        }
    }
}
