// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use abp_core::{CommandJob, Job, JobId, JobResult, ProcessSchedulerResult, StdContent};
use clap::ValueEnum;
use serde::Serialize;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One finished job as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    pub id: JobId,
    pub command: String,
    /// `None` when the job never got to run.
    pub result: Option<JobResult>,
    pub duration_ms: Option<u64>,
    pub return_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl JobRow {
    pub fn from_job(job: Job<CommandJob, StdContent>) -> Self {
        let (info, meta, output) = job.into_parts();
        let output = output.unwrap_or_default();
        Self {
            id: info.id,
            command: info.command.to_string(),
            result: meta.result,
            duration_ms: meta.duration.map(|d| d.as_millis() as u64),
            return_code: meta.return_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result == Some(JobResult::Success)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcome: ProcessSchedulerResult,
    pub jobs: Vec<JobRow>,
}

impl BatchReport {
    pub fn failures(&self) -> usize {
        self.jobs.iter().filter(|row| !row.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures() == 0
    }
}

/// Format a duration compactly (e.g., "15ms", "2.4s", "3m05s")
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// `<id> <result> <duration> <return code>`, with `-` for anything unknown.
pub fn format_row(row: &JobRow) -> String {
    let result = row.result.map_or_else(|| "-".to_string(), |r| r.to_string());
    let duration = row
        .duration_ms
        .map_or_else(|| "-".to_string(), |ms| format_duration(Duration::from_millis(ms)));
    let code = row.return_code.map_or_else(|| "-".to_string(), |c| c.to_string());
    format!("{} {} {} {}", row.id, result, duration, code)
}

pub fn render(report: &BatchReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for row in &report.jobs {
                out.push_str(&format_row(row));
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(&report.jobs)?;
            out.push('\n');
            Ok(out)
        }
    }
}

pub fn print_report(report: &BatchReport, format: OutputFormat) -> anyhow::Result<()> {
    print!("{}", render(report, format)?);
    Ok(())
}
