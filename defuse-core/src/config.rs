//! Game and protocol tuning for both roles. Hosts embed these in their config files.

use serde::Deserialize;

use crate::pending::DEFAULT_PENDING_CAPACITY;
use crate::registry::MAX_MODULES;

/// Coordinator configuration. Intervals are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Strikes that fail the bomb (default 3).
    #[serde(default = "default_max_strikes")]
    pub max_strikes: u8,
    /// Countdown length (default 5 minutes).
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Registry bound (default 15).
    #[serde(default = "default_max_modules")]
    pub max_modules: usize,
    /// Presence (Connection) broadcast, always on.
    #[serde(default = "default_connection_interval_ms")]
    pub connection_interval_ms: u64,
    /// Heartbeat broadcast during the countdown.
    #[serde(default = "default_fast_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Start broadcast until every registered peer has acknowledged.
    #[serde(default = "default_fast_interval_ms")]
    pub start_interval_ms: u64,
    /// Start rebroadcast once running, for peers that missed it.
    #[serde(default = "default_start_running_interval_ms")]
    pub start_running_interval_ms: u64,
    /// Reset broadcast while a reset is pending.
    #[serde(default = "default_fast_interval_ms")]
    pub reset_interval_ms: u64,
}

fn default_max_strikes() -> u8 {
    3
}
fn default_duration_ms() -> u64 {
    5 * 60 * 1000
}
fn default_max_modules() -> usize {
    MAX_MODULES
}
fn default_connection_interval_ms() -> u64 {
    1000
}
fn default_fast_interval_ms() -> u64 {
    50
}
fn default_start_running_interval_ms() -> u64 {
    500
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_strikes: default_max_strikes(),
            duration_ms: default_duration_ms(),
            max_modules: default_max_modules(),
            connection_interval_ms: default_connection_interval_ms(),
            heartbeat_interval_ms: default_fast_interval_ms(),
            start_interval_ms: default_fast_interval_ms(),
            start_running_interval_ms: default_start_running_interval_ms(),
            reset_interval_ms: default_fast_interval_ms(),
        }
    }
}

/// How a BombInfo response is matched to waiting callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoCorrelation {
    /// Any response resolves and clears every waiter, whatever its key.
    #[default]
    AllPending,
    /// Only the waiter whose key equals the response's `request_key` is resolved.
    Keyed,
}

/// Peripheral configuration. Intervals are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeripheralConfig {
    /// BombInfoRequest resend while any waiter is pending.
    #[serde(default = "default_fast_interval_ms")]
    pub info_request_interval_ms: u64,
    /// Resend of the earliest un-acknowledged solve attempt.
    #[serde(default = "default_fast_interval_ms")]
    pub solve_attempt_interval_ms: u64,
    /// Secret-code poll.
    #[serde(default = "default_code_poll_interval_ms")]
    pub code_poll_interval_ms: u64,
    /// Bound on each pending map; the oldest entry is evicted when full.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    #[serde(default)]
    pub info_correlation: InfoCorrelation,
}

fn default_code_poll_interval_ms() -> u64 {
    200
}
fn default_pending_capacity() -> usize {
    DEFAULT_PENDING_CAPACITY
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            info_request_interval_ms: default_fast_interval_ms(),
            solve_attempt_interval_ms: default_fast_interval_ms(),
            code_poll_interval_ms: default_code_poll_interval_ms(),
            pending_capacity: default_pending_capacity(),
            info_correlation: InfoCorrelation::default(),
        }
    }
}
