// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! abp-engine: process scheduling, job runs and the builder pool

mod builder;
mod config;
pub mod env;
mod error;
mod manager;
mod registry;
mod runner;
mod scheduler;

pub use builder::{Builder, BuilderRef, BuilderRunJobOutcome};
pub use config::{ConfigError, PoolConfig};
pub use error::PoolError;
pub use manager::BuilderManager;
pub use registry::BuilderList;
pub use runner::{JobData, JobRunner};
pub use scheduler::ProcessScheduler;
