//! Pool configuration loading from environment variables.
//!
//! All values are loaded from `REQUEST_POOL_*` environment variables with
//! sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `REQUEST_POOL_MAX_CONCURRENT` | 6 | Global concurrency ceiling |
//! | `REQUEST_POOL_GRAB_DELAY_MS` | 20 | Inter-tick debounce delay (ms) |
//! | `REQUEST_POOL_MAX_RETRIES` | 0 | Retry budget per item (0 = disabled) |

use std::time::Duration;

use crate::scheduler::ConcurrencyPolicy;

/// Default global ceiling, matching a typical per-host connection budget.
const DEFAULT_MAX_CONCURRENT: usize = 6;
/// Default debounce window between wake and tick.
const DEFAULT_GRAB_DELAY_MS: u64 = 20;

/// Pool-wide configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Global concurrency ceiling across all classes, re-resolved fresh
    /// every tick. Supply a `Dynamic` policy to track runtime conditions.
    pub ceiling: ConcurrencyPolicy,
    /// Debounce window between a wake and the next scheduling pass, so a
    /// burst of synchronous enqueues collapses into one tick.
    pub grab_delay: Duration,
    /// Automatic re-fetch attempts permitted per item after failure.
    /// Zero disables retry.
    pub max_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            ceiling: ConcurrencyPolicy::Fixed(DEFAULT_MAX_CONCURRENT),
            grab_delay: Duration::from_millis(DEFAULT_GRAB_DELAY_MS),
            max_retries: 0,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> PoolConfig {
    let max_concurrent = parse_usize("REQUEST_POOL_MAX_CONCURRENT", DEFAULT_MAX_CONCURRENT);
    let max_concurrent = max_concurrent.max(1);
    let grab_delay_ms = parse_u64("REQUEST_POOL_GRAB_DELAY_MS", DEFAULT_GRAB_DELAY_MS);
    let grab_delay_ms = grab_delay_ms.clamp(1, 1000);
    let max_retries = parse_u32("REQUEST_POOL_MAX_RETRIES", 0);

    PoolConfig {
        ceiling: ConcurrencyPolicy::Fixed(max_concurrent),
        grab_delay: Duration::from_millis(grab_delay_ms),
        max_retries,
    }
}
