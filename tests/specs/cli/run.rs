// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `abp run`.

use crate::prelude::*;

const MIXED: &str = r#"
max_concurrent = 2

[[job]]
command = ["sh", "-c", "sleep 0.2; echo first"]

[[job]]
command = ["sh", "-c", "exit 3"]

[[job]]
command = ["true"]
"#;

#[test]
fn empty_batch_prints_nothing() {
    let temp = Project::empty();
    temp.file("jobs.toml", "");
    temp.abp().args(&["run", "jobs.toml"]).passes().stdout_eq("");
}

#[test]
fn prints_one_line_per_job_in_batch_order() {
    let temp = Project::empty();
    temp.file("jobs.toml", MIXED);

    let run = temp.abp().args(&["run", "jobs.toml"]).exits(1);
    let stdout = run.stdout();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "{stdout}");
    assert!(lines[0].starts_with("1 success "), "{stdout}");
    assert!(lines[0].ends_with(" 0"), "{stdout}");
    assert!(lines[1].starts_with("2 executed_with_failure "), "{stdout}");
    assert!(lines[1].ends_with(" 3"), "{stdout}");
    assert!(lines[2].starts_with("3 success "), "{stdout}");
    run.stderr_has("1 of 3 job(s) did not succeed");
}

#[test]
fn all_successful_jobs_exit_zero() {
    let temp = Project::empty();
    temp.file(
        "jobs.toml",
        "[[job]]\ncommand = [\"true\"]\n\n[[job]]\ncommand = [\"sh\", \"-c\", \"exit 0\"]\n",
    );
    temp.abp().args(&["run", "jobs.toml"]).passes().stdout_has("2 success");
}

#[test]
fn json_output_includes_captured_streams() {
    let temp = Project::empty();
    temp.file("jobs.toml", "[[job]]\ncommand = [\"sh\", \"-c\", \"echo out; echo err >&2\"]\n");

    let json = temp.abp().args(&["run", "jobs.toml", "-o", "json"]).passes().stdout_json();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["result"], "success");
    assert_eq!(rows[0]["return_code"], 0);
    assert_eq!(rows[0]["stdout"], "out\n");
    assert_eq!(rows[0]["stderr"], "err\n");
}

#[test]
fn no_capture_lets_job_output_through() {
    let temp = Project::empty();
    temp.file("jobs.toml", "[[job]]\ncommand = [\"echo\", \"straight-through\"]\n");
    temp.abp()
        .args(&["run", "jobs.toml", "--no-capture"])
        .passes()
        .stdout_has("straight-through")
        .stdout_has("1 success");
}

#[test]
fn captured_output_stays_out_of_text_report() {
    let temp = Project::empty();
    temp.file("jobs.toml", "[[job]]\ncommand = [\"echo\", \"kept-quiet\"]\n");
    temp.abp().args(&["run", "jobs.toml"]).passes().stdout_lacks("kept-quiet");
}

#[test]
fn job_timeout_flag_overrides_file() {
    let temp = Project::empty();
    temp.file("jobs.toml", "job_timeout_ms = 60000\n\n[[job]]\ncommand = [\"sleep\", \"30\"]\n");
    temp.abp()
        .args(&["run", "jobs.toml", "--job-timeout-ms", "100"])
        .exits(1)
        .stdout_has("1 timeout");
}

#[test]
fn runner_timeout_leaves_pending_jobs_unrun() {
    let temp = Project::empty();
    temp.file(
        "jobs.toml",
        "[[job]]\ncommand = [\"sleep\", \"30\"]\n\n[[job]]\ncommand = [\"true\"]\n",
    );
    temp.abp()
        .args(&["run", "jobs.toml", "--max-concurrent", "1", "--runner-timeout-ms", "200"])
        .exits(1)
        .stdout_has("1 terminated")
        .stdout_has("2 - - -");
}

#[test]
fn missing_batch_file_is_a_usage_error() {
    let temp = Project::empty();
    temp.abp()
        .args(&["run", "nope.toml"])
        .exits(2)
        .stderr_has("failed to read")
        .stderr_has("nope.toml");
}

#[test]
fn empty_command_is_reported() {
    let temp = Project::empty();
    temp.file("jobs.toml", "[[job]]\ncommand = []\n");
    temp.abp().args(&["run", "jobs.toml"]).exits(2).stderr_has("job 1 has an empty command");
}

#[test]
fn log_file_receives_batch_summary() {
    let temp = Project::empty();
    temp.file("jobs.toml", "[[job]]\ncommand = [\"true\"]\n");
    temp.abp()
        .env("ABP_LOG", "info")
        .args(&["run", "jobs.toml", "--log-file", "logs/abp.log"])
        .passes();

    let log = std::fs::read_to_string(temp.path().join("logs/abp.log")).unwrap();
    assert!(log.contains("batch finished"), "{log}");
}
