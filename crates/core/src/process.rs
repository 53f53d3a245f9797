// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process launch descriptions and the values exchanged with scheduler callbacks.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Program plus arguments for one process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl JobCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: None, env: Vec::new() }
    }

    /// Build from an argv vector; `None` when empty.
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let program = iter.next()?;
        Some(Self { program, args: iter.collect(), cwd: None, env: Vec::new() })
    }

    /// Shorthand for `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Where a child's stdout or stderr goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdRouting {
    /// Dropped.
    #[default]
    Discard,
    /// Collected and handed to the exit callback.
    Capture,
    /// Shared with the parent's own stream.
    Inherit,
    /// Piped into a bounded buffer that the owner drains with `pump()`;
    /// nothing is retained.
    Stream,
}

/// Immutable description of one process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    id: JobId,
    command: JobCommand,
    stdout: StdRouting,
    stderr: StdRouting,
}

impl ProcessInfo {
    pub fn new(id: JobId, command: JobCommand, stdout: StdRouting, stderr: StdRouting) -> Self {
        Self { id, command, stdout, stderr }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn command(&self) -> &JobCommand {
        &self.command
    }

    pub fn stdout(&self) -> StdRouting {
        self.stdout
    }

    pub fn stderr(&self) -> StdRouting {
        self.stderr
    }
}

/// How a launched process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCondition {
    /// Exited on its own; the return code is meaningful.
    Graceful,
    /// Killed because its own time limit elapsed.
    Timeout,
    /// Killed by the scheduler (batch timeout or cancellation).
    Terminated,
}

crate::simple_display! {
    ExitCondition {
        Graceful => "graceful",
        Timeout => "timeout",
        Terminated => "terminated",
    }
}

/// Whether a launch attempt produced a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchResult {
    Success,
    Failure,
}

/// Returned by scheduler callbacks to keep going or stop accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallbackAction {
    #[default]
    Continue,
    Stop,
}

/// Aggregate outcome of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessSchedulerResult {
    /// Every process was launched (or failed to) and resolved.
    Completed,
    /// The batch-wide time limit elapsed.
    Timeout,
    /// A callback asked to stop, or the batch was cancelled.
    Cancelled,
}

crate::simple_display! {
    ProcessSchedulerResult {
        Completed => "completed",
        Timeout => "timeout",
        Cancelled => "cancelled",
    }
}

/// Captured standard streams of a finished process.
///
/// A stream is `None` unless it was routed to [`StdRouting::Capture`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdContent {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
