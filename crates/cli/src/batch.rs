// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch files: a TOML list of commands plus optional run limits.
//!
//! ```toml
//! max_concurrent = 4
//! job_timeout_ms = 5000
//!
//! [[job]]
//! command = ["sh", "-c", "echo hi"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use abp_core::{CommandJob, JobCommand, JobId};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("job {index} has an empty command")]
    EmptyCommand { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchFile {
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    pub job_timeout_ms: Option<u64>,
    #[serde(default)]
    pub runner_timeout_ms: Option<u64>,
    /// Capture job stdout/stderr. When off, jobs share the terminal.
    #[serde(default = "default_capture")]
    pub capture: bool,
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub command: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_capture() -> bool {
    true
}

impl BatchFile {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| BatchError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&text).map_err(|source| BatchError::Parse { path: path.to_path_buf(), source })
    }

    /// Jobs numbered from 1 in file order.
    pub fn commands(&self) -> Result<Vec<CommandJob>, BatchError> {
        self.jobs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let index = i + 1;
                let mut command = JobCommand::from_argv(spec.command.iter().cloned())
                    .ok_or(BatchError::EmptyCommand { index })?;
                command.cwd = spec.cwd.clone();
                command.env = spec.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Ok(CommandJob::new(JobId::new(index as u64), command))
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
