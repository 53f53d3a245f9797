// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.
//!
//! Each accessor returns `Ok(None)` when the variable is unset and an error
//! when it is set to something unparsable.

use std::str::FromStr;
use std::time::Duration;

use crate::config::ConfigError;

pub const MAX_CONCURRENT_PROCESSES: &str = "ABP_MAX_CONCURRENT_PROCESSES";
pub const IDLE_PUMP_DELAY_MS: &str = "ABP_IDLE_PUMP_DELAY_MS";
pub const ALLOW_UNMANAGED_BUILDERS: &str = "ABP_ALLOW_UNMANAGED_BUILDERS";
pub const STARTUP_TIMEOUT_MS: &str = "ABP_STARTUP_TIMEOUT_MS";
pub const ID_COLLISION_RETRIES: &str = "ABP_ID_COLLISION_RETRIES";

fn parsed<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

fn millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parsed::<u64>(var)?.map(Duration::from_millis))
}

/// Concurrency cap override
pub fn max_concurrent_processes() -> Result<Option<usize>, ConfigError> {
    parsed(MAX_CONCURRENT_PROCESSES)
}

/// Interval between idle builder pumps
pub fn idle_pump_delay() -> Result<Option<Duration>, ConfigError> {
    millis(IDLE_PUMP_DELAY_MS)
}

/// Accepts `1`/`0` as well as `true`/`false`.
pub fn allow_unmanaged_builders() -> Result<Option<bool>, ConfigError> {
    match std::env::var(ALLOW_UNMANAGED_BUILDERS) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { var: ALLOW_UNMANAGED_BUILDERS, value }),
        },
        Err(_) => Ok(None),
    }
}

/// How long a freshly started builder gets to connect
pub fn startup_timeout() -> Result<Option<Duration>, ConfigError> {
    millis(STARTUP_TIMEOUT_MS)
}

pub fn id_collision_retries() -> Result<Option<u32>, ConfigError> {
    parsed(ID_COLLISION_RETRIES)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
