// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job descriptors, per-job run metadata, and the finished job record.

use crate::id::JobId;
use crate::process::{ExitCondition, JobCommand};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// What the job runner needs to know about a caller's job descriptor.
pub trait JobInfo {
    fn id(&self) -> JobId;
    fn command(&self) -> &JobCommand;
}

/// Minimal job descriptor: an id and a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandJob {
    pub id: JobId,
    pub command: JobCommand,
}

impl CommandJob {
    pub fn new(id: impl Into<JobId>, command: JobCommand) -> Self {
        Self { id: id.into(), command }
    }
}

impl JobInfo for CommandJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn command(&self) -> &JobCommand {
        &self.command
    }
}

/// Classification of a job's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    /// Exited on its own with return code 0.
    Success,
    /// Exited on its own with a non-zero return code.
    ExecutedWithFailure,
    /// The process could not be launched.
    FailedToExecute,
    /// Killed by the scheduler before it finished.
    Terminated,
    /// Killed because it exceeded the per-job time limit.
    Timeout,
}

impl JobResult {
    /// Classify a process exit.
    pub fn from_exit(condition: ExitCondition, return_code: i32) -> Self {
        match condition {
            ExitCondition::Graceful if return_code == 0 => JobResult::Success,
            ExitCondition::Graceful => JobResult::ExecutedWithFailure,
            ExitCondition::Terminated => JobResult::Terminated,
            ExitCondition::Timeout => JobResult::Timeout,
        }
    }

    /// Whether the process actually ran to completion (successfully or not).
    pub fn ran_to_completion(&self) -> bool {
        matches!(self, JobResult::Success | JobResult::ExecutedWithFailure)
    }
}

crate::simple_display! {
    JobResult {
        Success => "success",
        ExecutedWithFailure => "executed_with_failure",
        FailedToExecute => "failed_to_execute",
        Terminated => "terminated",
        Timeout => "timeout",
    }
}

/// Timing and outcome of one job's process.
///
/// Starts empty. The scheduler's launch callback fills in the start (or marks
/// a launch failure) and the exit callback fills in the rest. A job that was
/// never attempted keeps `result == None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobMeta {
    pub start_time: Option<Instant>,
    /// Wall-clock start, milliseconds since the unix epoch.
    pub started_at_ms: Option<u64>,
    pub duration: Option<Duration>,
    pub return_code: Option<i32>,
    pub result: Option<JobResult>,
}

impl JobMeta {
    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        *self == JobMeta::default()
    }

    /// Record a successful launch.
    pub fn mark_launched(&mut self, at: Instant, epoch_ms: u64) {
        self.start_time = Some(at);
        self.started_at_ms = Some(epoch_ms);
    }

    /// Record a launch failure. Terminal: no exit follows.
    pub fn mark_launch_failed(&mut self) {
        self.result = Some(JobResult::FailedToExecute);
    }

    /// Record the exit and classify it.
    pub fn mark_exited(&mut self, condition: ExitCondition, return_code: i32, at: Instant) {
        self.duration = self.start_time.map(|start| at.saturating_duration_since(start));
        self.return_code = Some(return_code);
        self.result = Some(JobResult::from_exit(condition, return_code));
    }
}

/// A finished job: the caller's descriptor, its run metadata, and the payload
/// produced from its output (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct Job<I, P> {
    info: I,
    meta: JobMeta,
    payload: Option<P>,
}

impl<I: JobInfo, P> Job<I, P> {
    pub fn new(info: I, meta: JobMeta, payload: Option<P>) -> Self {
        Self { info, meta, payload }
    }

    pub fn id(&self) -> JobId {
        self.info.id()
    }

    pub fn info(&self) -> &I {
        &self.info
    }

    pub fn meta(&self) -> &JobMeta {
        &self.meta
    }

    pub fn result(&self) -> Option<JobResult> {
        self.meta.result
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub fn into_parts(self) -> (I, JobMeta, Option<P>) {
        (self.info, self.meta, self.payload)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
