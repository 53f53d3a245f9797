// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed job execution on top of [`ProcessScheduler`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use abp_adapters::{ProcessLauncher, SystemLauncher};
use abp_core::{
    CallbackAction, Clock, ExitCondition, Job, JobId, JobInfo, JobMeta, JobResult, LaunchResult,
    ProcessInfo, ProcessSchedulerResult, StdContent, StdRouting, SystemClock,
};
use tokio_util::sync::CancellationToken;

use crate::scheduler::ProcessScheduler;

/// Everything recorded about one job, handed to the payload producer.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData<I> {
    pub info: I,
    pub meta: JobMeta,
    /// Streams routed to [`StdRouting::Capture`]; empty otherwise.
    pub output: StdContent,
}

enum Slot<I> {
    Keyed(JobId),
    /// Shares its id with an earlier job; never scheduled.
    Duplicate(I),
}

struct RunState<I, CB> {
    data: HashMap<JobId, JobData<I>>,
    callback: CB,
}

/// Runs jobs as processes and assembles typed [`Job`] results.
pub struct JobRunner<L = SystemLauncher, C = SystemClock> {
    scheduler: ProcessScheduler<L, C>,
}

impl JobRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self { scheduler: ProcessScheduler::new(max_concurrent) }
    }
}

impl<L: ProcessLauncher, C: Clock> JobRunner<L, C> {
    pub fn with_scheduler(scheduler: ProcessScheduler<L, C>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &ProcessScheduler<L, C> {
        &self.scheduler
    }

    /// Run `jobs` and return them, in input order, with their metadata and
    /// payloads.
    ///
    /// `job_callback` fires once per job when it resolves: right away for a
    /// launch failure, otherwise on exit. `payload_producer` is called exactly
    /// once, after every job has resolved. Jobs that failed to execute never
    /// carry a payload.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<I, P, F, CB>(
        &self,
        jobs: Vec<I>,
        payload_producer: F,
        stdout: StdRouting,
        stderr: StdRouting,
        job_timeout: Option<Duration>,
        runner_timeout: Option<Duration>,
        job_callback: CB,
    ) -> (ProcessSchedulerResult, Vec<Job<I, P>>)
    where
        I: JobInfo,
        F: FnOnce(&HashMap<JobId, JobData<I>>) -> HashMap<JobId, P>,
        CB: FnMut(&I, &JobMeta, &StdContent) -> CallbackAction,
    {
        self.execute_with_cancel(
            jobs,
            payload_producer,
            stdout,
            stderr,
            job_timeout,
            runner_timeout,
            None,
            job_callback,
        )
        .await
    }

    /// [`execute`](Self::execute) with an external cancellation token.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_with_cancel<I, P, F, CB>(
        &self,
        jobs: Vec<I>,
        payload_producer: F,
        stdout: StdRouting,
        stderr: StdRouting,
        job_timeout: Option<Duration>,
        runner_timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
        job_callback: CB,
    ) -> (ProcessSchedulerResult, Vec<Job<I, P>>)
    where
        I: JobInfo,
        F: FnOnce(&HashMap<JobId, JobData<I>>) -> HashMap<JobId, P>,
        CB: FnMut(&I, &JobMeta, &StdContent) -> CallbackAction,
    {
        let mut data = HashMap::with_capacity(jobs.len());
        let mut order = Vec::with_capacity(jobs.len());
        let mut infos = Vec::with_capacity(jobs.len());

        for job in jobs {
            let id = job.id();
            if data.contains_key(&id) {
                tracing::warn!(job = %id, "duplicate job id, skipping");
                order.push(Slot::Duplicate(job));
                continue;
            }
            infos.push(ProcessInfo::new(id, job.command().clone(), stdout, stderr));
            data.insert(
                id,
                JobData { info: job, meta: JobMeta::default(), output: StdContent::default() },
            );
            order.push(Slot::Keyed(id));
        }

        let state = RefCell::new(RunState { data, callback: job_callback });
        let clock = self.scheduler.clock();

        let result = self
            .scheduler
            .execute(
                infos,
                job_timeout,
                runner_timeout,
                cancel,
                |id, launched, at| {
                    let mut state = state.borrow_mut();
                    let RunState { data, callback } = &mut *state;
                    let Some(job) = data.get_mut(&id) else {
                        return CallbackAction::Continue;
                    };
                    match launched {
                        LaunchResult::Success => {
                            job.meta.mark_launched(at, clock.epoch_ms());
                            CallbackAction::Continue
                        }
                        LaunchResult::Failure => {
                            job.meta.mark_launch_failed();
                            callback(&job.info, &job.meta, &job.output)
                        }
                    }
                },
                |id, condition: ExitCondition, return_code, output, at| {
                    let mut state = state.borrow_mut();
                    let RunState { data, callback } = &mut *state;
                    let Some(job) = data.get_mut(&id) else {
                        return CallbackAction::Continue;
                    };
                    job.meta.mark_exited(condition, return_code, at);
                    job.output = output;
                    callback(&job.info, &job.meta, &job.output)
                },
            )
            .await;

        let RunState { mut data, .. } = state.into_inner();
        let mut payloads = payload_producer(&data);

        let jobs = order
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Keyed(id) => data.remove(&id).map(|job| {
                    let payload = match job.meta.result {
                        Some(JobResult::FailedToExecute) => None,
                        _ => payloads.remove(&id),
                    };
                    Job::new(job.info, job.meta, payload)
                }),
                Slot::Duplicate(info) => Some(Job::new(info, JobMeta::default(), None)),
            })
            .collect();

        (result, jobs)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
