// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use abp_core::{Purpose, WorkerId};
use thiserror::Error;

/// Why [`BuilderManager::get_builder`](crate::BuilderManager::get_builder)
/// could not hand out a builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("builder pool is shutting down")]
    Shutdown,

    #[error("failed to generate a unique builder id after {attempts} attempts")]
    IdCollision { attempts: u32 },

    #[error("builder {builder_id} ({purpose}) failed to start: {reason}")]
    StartFailure { builder_id: WorkerId, purpose: Purpose, reason: String },
}
