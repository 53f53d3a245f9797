// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder capability classes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What kind of work a builder was started for.
///
/// A builder is created for exactly one purpose and keeps it for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Answers a one-off "which builders do you provide" query. Never reused.
    Registration,
    /// Runs the job-creation step for source assets.
    CreateJobs,
    /// Runs the processing step that produces artifacts.
    ProcessJob,
}

impl Purpose {
    pub const ALL: [Purpose; 3] = [Purpose::Registration, Purpose::CreateJobs, Purpose::ProcessJob];

    /// Whether idle builders of this purpose may be handed out again.
    pub fn is_reusable(&self) -> bool {
        !matches!(self, Purpose::Registration)
    }

    /// Value passed to the builder executable as `-task=<value>`.
    pub fn task_arg(&self) -> &'static str {
        match self {
            Purpose::Registration => "register",
            Purpose::CreateJobs => "create",
            Purpose::ProcessJob => "process",
        }
    }
}

crate::simple_display! {
    Purpose {
        Registration => "registration",
        CreateJobs => "create_jobs",
        ProcessJob => "process_job",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown builder purpose `{0}`")]
pub struct PurposeParseError(pub String);

impl FromStr for Purpose {
    type Err = PurposeParseError;

    /// Accepts both the display name and the task argument.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Purpose::ALL
            .into_iter()
            .find(|p| p.to_string() == s || p.task_arg() == s)
            .ok_or_else(|| PurposeParseError(s.to_string()))
    }
}

#[cfg(test)]
#[path = "purpose_tests.rs"]
mod tests;
