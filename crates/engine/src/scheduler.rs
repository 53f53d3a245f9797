// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrency-bounded process scheduler.
//!
//! One coordinating future owns the pending queue and the callbacks. Every
//! launched process is supervised by its own task, which enforces the per-job
//! timeout and reports back through a [`JoinSet`]. Callbacks therefore always
//! run on the caller's task, and a job's launch callback always precedes its
//! exit callback.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use abp_adapters::{ProcessHandle, ProcessLauncher, SystemLauncher};
use abp_core::{
    CallbackAction, Clock, ExitCondition, JobId, LaunchResult, ProcessInfo,
    ProcessSchedulerResult, StdContent, SystemClock,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

struct Exited {
    condition: ExitCondition,
    return_code: i32,
    output: StdContent,
}

enum Event {
    Exited(JobId, Exited),
    Drained,
    RunnerTimeout,
    Cancelled,
}

/// Runs batches of processes with at most `max_concurrent` alive at once.
pub struct ProcessScheduler<L = SystemLauncher, C = SystemClock> {
    launcher: L,
    clock: C,
    max_concurrent: usize,
}

impl ProcessScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_parts(SystemLauncher::default(), SystemClock, max_concurrent)
    }
}

impl<L: ProcessLauncher, C: Clock> ProcessScheduler<L, C> {
    /// A cap of zero is treated as one.
    pub fn with_parts(launcher: L, clock: C, max_concurrent: usize) -> Self {
        Self { launcher, clock, max_concurrent: max_concurrent.max(1) }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run every process in `infos`, returning once all launched processes
    /// have exited.
    ///
    /// - `job_timeout` bounds each process individually; it is terminated and
    ///   reported as [`ExitCondition::Timeout`].
    /// - `runner_timeout` bounds the batch. Running processes are terminated
    ///   ([`ExitCondition::Terminated`]) and queued ones never launch.
    /// - `cancel` behaves like `runner_timeout` but yields `Cancelled`.
    /// - A callback returning [`CallbackAction::Stop`] stops new launches;
    ///   running processes finish on their own.
    ///
    /// A process that fails to spawn gets one `on_launch(.., Failure, ..)` and
    /// no `on_exit`.
    pub async fn execute<FL, FE>(
        &self,
        infos: Vec<ProcessInfo>,
        job_timeout: Option<Duration>,
        runner_timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
        mut on_launch: FL,
        mut on_exit: FE,
    ) -> ProcessSchedulerResult
    where
        FL: FnMut(JobId, LaunchResult, Instant) -> CallbackAction,
        FE: FnMut(JobId, ExitCondition, i32, StdContent, Instant) -> CallbackAction,
    {
        let total = infos.len();
        let mut pending: VecDeque<ProcessInfo> = infos.into();
        let mut running: JoinSet<Exited> = JoinSet::new();
        let mut tasks: HashMap<tokio::task::Id, JobId> = HashMap::new();
        let kill = CancellationToken::new();
        let deadline = runner_timeout.map(|t| tokio::time::Instant::now() + t);

        let mut outcome = ProcessSchedulerResult::Completed;
        let mut accepting = true;
        let mut killed = false;

        loop {
            if !killed {
                if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    outcome = ProcessSchedulerResult::Cancelled;
                    killed = true;
                } else if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    if outcome == ProcessSchedulerResult::Completed {
                        outcome = ProcessSchedulerResult::Timeout;
                    }
                    killed = true;
                }
                if killed {
                    accepting = false;
                    kill.cancel();
                }
            }

            while accepting && running.len() < self.max_concurrent {
                let Some(info) = pending.pop_front() else { break };
                let id = info.id();
                let launched = self.launcher.launch(info.command(), info.stdout(), info.stderr());
                let action = match launched {
                    Ok(handle) => {
                        tracing::debug!(job = %id, pid = handle.pid(), "process launched");
                        let abort = running.spawn(supervise(handle, job_timeout, kill.clone()));
                        tasks.insert(abort.id(), id);
                        on_launch(id, LaunchResult::Success, self.clock.now())
                    }
                    Err(e) => {
                        tracing::warn!(job = %id, error = %e, "process failed to launch");
                        on_launch(id, LaunchResult::Failure, self.clock.now())
                    }
                };
                if action == CallbackAction::Stop {
                    accepting = false;
                    outcome = ProcessSchedulerResult::Cancelled;
                }
            }

            if running.is_empty() {
                break;
            }

            let event = tokio::select! {
                joined = running.join_next_with_id() => match joined {
                    Some(Ok((task, exited))) => Event::Exited(job_for(&mut tasks, task), exited),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "process supervisor failed");
                        Event::Exited(
                            job_for(&mut tasks, e.id()),
                            Exited {
                                condition: ExitCondition::Terminated,
                                return_code: -1,
                                output: StdContent::default(),
                            },
                        )
                    }
                    None => Event::Drained,
                },
                _ = sleep_until(deadline), if !killed => Event::RunnerTimeout,
                _ = cancelled(cancel.as_ref()), if !killed => Event::Cancelled,
            };

            match event {
                Event::Exited(id, exited) => {
                    tracing::debug!(
                        job = %id,
                        condition = %exited.condition,
                        return_code = exited.return_code,
                        "process exited"
                    );
                    let action = on_exit(
                        id,
                        exited.condition,
                        exited.return_code,
                        exited.output,
                        self.clock.now(),
                    );
                    if action == CallbackAction::Stop && accepting {
                        accepting = false;
                        outcome = ProcessSchedulerResult::Cancelled;
                    }
                }
                Event::Drained => break,
                Event::RunnerTimeout => {
                    tracing::info!(
                        running = running.len(),
                        queued = pending.len(),
                        "runner timed out"
                    );
                    if outcome == ProcessSchedulerResult::Completed {
                        outcome = ProcessSchedulerResult::Timeout;
                    }
                    accepting = false;
                    killed = true;
                    kill.cancel();
                }
                Event::Cancelled => {
                    tracing::info!(
                        running = running.len(),
                        queued = pending.len(),
                        "batch cancelled"
                    );
                    outcome = ProcessSchedulerResult::Cancelled;
                    accepting = false;
                    killed = true;
                    kill.cancel();
                }
            }
        }

        tracing::debug!(total, unlaunched = pending.len(), %outcome, "batch finished");
        outcome
    }
}

/// Resolve a finished task back to its job. Every spawned task is recorded
/// before it can be joined, so a miss is unreachable.
fn job_for(tasks: &mut HashMap<tokio::task::Id, JobId>, task: tokio::task::Id) -> JobId {
    tasks.remove(&task).unwrap_or_default()
}

async fn supervise(
    mut handle: ProcessHandle,
    job_timeout: Option<Duration>,
    kill: CancellationToken,
) -> Exited {
    let waited = tokio::select! {
        condition = handle.wait(job_timeout) => Some(condition),
        _ = kill.cancelled() => None,
    };
    let condition = match waited {
        Some(condition) => condition,
        None => {
            // A timed-out wait may have been dropped mid-terminate.
            let timed_out = handle.was_terminated();
            handle.terminate().await;
            // Lost the race with a natural exit.
            let condition = handle.wait(None).await;
            if timed_out {
                ExitCondition::Timeout
            } else {
                condition
            }
        }
    };
    let output = handle.take_output().await;
    Exited { condition, return_code: handle.return_code().unwrap_or(-1), output }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
