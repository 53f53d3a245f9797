// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `abp run`: execute a batch file through the job runner

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use abp_core::{CallbackAction, CommandJob, JobId, StdContent, StdRouting};
use abp_engine::{JobData, JobRunner};
use anyhow::{bail, Result};
use clap::Args;

use crate::batch::BatchFile;
use crate::exit_error::ExitError;
use crate::output::{self, BatchReport, JobRow, OutputFormat};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Batch file (TOML) listing the jobs to run
    pub file: PathBuf,

    /// Maximum number of jobs running at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Kill a job that runs longer than this many milliseconds
    #[arg(long)]
    pub job_timeout_ms: Option<u64>,

    /// Stop the whole batch after this many milliseconds
    #[arg(long)]
    pub runner_timeout_ms: Option<u64>,

    /// Let jobs write straight to the terminal instead of capturing output
    #[arg(long)]
    pub no_capture: bool,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t)]
    pub output: OutputFormat,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// A batch with command-line overrides applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub jobs: Vec<CommandJob>,
    pub max_concurrent: usize,
    pub job_timeout: Option<Duration>,
    pub runner_timeout: Option<Duration>,
    pub routing: StdRouting,
}

impl RunPlan {
    /// Flags win over the file; the concurrency cap falls back to
    /// `ABP_MAX_CONCURRENT_PROCESSES`, then to the number of CPUs.
    pub fn resolve(batch: &BatchFile, args: &RunArgs) -> Result<Self> {
        let max_concurrent = match args.max_concurrent.or(batch.max_concurrent) {
            Some(n) => n,
            None => {
                abp_engine::env::max_concurrent_processes()?.unwrap_or_else(default_concurrency)
            }
        };
        if max_concurrent == 0 {
            bail!("max_concurrent must be greater than zero");
        }

        let routing = if args.no_capture || !batch.capture {
            StdRouting::Inherit
        } else {
            StdRouting::Capture
        };

        Ok(Self {
            jobs: batch.commands()?,
            max_concurrent,
            job_timeout: args.job_timeout_ms.or(batch.job_timeout_ms).map(Duration::from_millis),
            runner_timeout: args
                .runner_timeout_ms
                .or(batch.runner_timeout_ms)
                .map(Duration::from_millis),
            routing,
        })
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

pub async fn run(args: RunArgs) -> Result<()> {
    let batch = BatchFile::load(&args.file)?;
    let plan = RunPlan::resolve(&batch, &args)?;
    let report = execute(plan).await;

    output::print_report(&report, args.output)?;
    if report.all_succeeded() {
        Ok(())
    } else {
        Err(ExitError::jobs_failed(report.failures(), report.jobs.len()).into())
    }
}

/// Run every job and collect one row per job, in batch order.
pub async fn execute(plan: RunPlan) -> BatchReport {
    let total = plan.jobs.len();
    tracing::info!(
        jobs = total,
        max_concurrent = plan.max_concurrent,
        job_timeout = ?plan.job_timeout,
        runner_timeout = ?plan.runner_timeout,
        "running batch"
    );

    let runner = JobRunner::new(plan.max_concurrent);
    let mut finished = 0usize;
    let (outcome, jobs) = runner
        .execute(
            plan.jobs,
            captured_output,
            plan.routing,
            plan.routing,
            plan.job_timeout,
            plan.runner_timeout,
            |job: &CommandJob, meta, _| {
                finished += 1;
                tracing::debug!(
                    job_id = %job.id,
                    result = ?meta.result,
                    return_code = ?meta.return_code,
                    "job finished ({finished}/{total})"
                );
                CallbackAction::Continue
            },
        )
        .await;

    let report = BatchReport { outcome, jobs: jobs.into_iter().map(JobRow::from_job).collect() };
    tracing::info!(%outcome, failed = report.failures(), jobs = total, "batch finished");
    report
}

/// Payload for each job: whatever its streams captured.
fn captured_output(data: &HashMap<JobId, JobData<CommandJob>>) -> HashMap<JobId, StdContent> {
    data.iter().map(|(id, job)| (*id, job.output.clone())).collect()
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
