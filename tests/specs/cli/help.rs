// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs

use crate::prelude::*;

#[test]
fn no_args_shows_usage_and_fails() {
    cli().exits(2).stderr_has("Usage:");
}

#[test]
fn help_lists_run() {
    cli().args(&["--help"]).passes().stdout_has("Usage:").stdout_has("run");
}

#[test]
fn run_help_lists_flags() {
    cli()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--max-concurrent")
        .stdout_has("--job-timeout-ms")
        .stdout_has("--runner-timeout-ms")
        .stdout_has("--no-capture")
        .stdout_has("--log-file");
}

#[test]
fn version_shows_version() {
    cli().args(&["--version"]).passes().stdout_has("0.2");
}
