// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder pool configuration.

use std::time::Duration;

use abp_adapters::LaunchOptions;
use thiserror::Error;

use crate::env;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Tunables for [`BuilderManager`](crate::BuilderManager) and the processes it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Builder executable. Launched as
    /// `<program> <args...> -id=<uuid> -task=<task> -platform=<platform>`.
    pub builder_program: String,
    pub builder_args: Vec<String>,
    pub max_concurrent_processes: usize,
    pub idle_pump_delay: Duration,
    /// Accept pings from builders this pool did not start.
    pub allow_unmanaged_builder_connections: bool,
    pub id_collision_retries: u32,
    pub startup_timeout: Duration,
    pub startup_poll: Duration,
    /// Extra attempts for a job whose builder connection dropped.
    pub retries_for_network_error: u32,
    pub stdio_buffer_lines: usize,
    pub terminate_grace: Duration,
    pub platform: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            builder_program: String::new(),
            builder_args: Vec::new(),
            max_concurrent_processes: default_concurrency(),
            idle_pump_delay: Duration::from_millis(100),
            allow_unmanaged_builder_connections: false,
            id_collision_retries: 10,
            startup_timeout: Duration::from_secs(60),
            startup_poll: Duration::from_millis(50),
            retries_for_network_error: 1,
            stdio_buffer_lines: 256,
            terminate_grace: Duration::from_millis(500),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl PoolConfig {
    pub fn new(builder_program: impl Into<String>) -> Self {
        Self { builder_program: builder_program.into(), ..Self::default() }
    }

    abp_core::setters! {
        into {
            builder_program: String,
            platform: String,
        }
        set {
            builder_args: Vec<String>,
            max_concurrent_processes: usize,
            idle_pump_delay: Duration,
            allow_unmanaged_builder_connections: bool,
            id_collision_retries: u32,
            startup_timeout: Duration,
            startup_poll: Duration,
            retries_for_network_error: u32,
            stdio_buffer_lines: usize,
            terminate_grace: Duration,
        }
    }

    /// Defaults overridden by `ABP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply `ABP_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(n) = env::max_concurrent_processes()? {
            self.max_concurrent_processes = n;
        }
        if let Some(delay) = env::idle_pump_delay()? {
            self.idle_pump_delay = delay;
        }
        if let Some(allow) = env::allow_unmanaged_builders()? {
            self.allow_unmanaged_builder_connections = allow;
        }
        if let Some(timeout) = env::startup_timeout()? {
            self.startup_timeout = timeout;
        }
        if let Some(retries) = env::id_collision_retries()? {
            self.id_collision_retries = retries;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_processes == 0 {
            return Err(ConfigError::Zero("max_concurrent_processes"));
        }
        if self.id_collision_retries == 0 {
            return Err(ConfigError::Zero("id_collision_retries"));
        }
        if self.idle_pump_delay.is_zero() {
            return Err(ConfigError::Zero("idle_pump_delay"));
        }
        if self.startup_poll.is_zero() {
            return Err(ConfigError::Zero("startup_poll"));
        }
        Ok(())
    }

    pub(crate) fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            buffer_lines: self.stdio_buffer_lines,
            terminate_grace: self.terminate_grace,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
