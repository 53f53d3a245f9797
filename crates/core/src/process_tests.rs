// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn from_argv_splits_program_and_args() {
    let cmd = JobCommand::from_argv(["echo", "a", "b"]).unwrap();
    assert_eq!(cmd.program, "echo");
    assert_eq!(cmd.args, vec!["a", "b"]);
}

#[test]
fn from_argv_rejects_empty() {
    assert!(JobCommand::from_argv(Vec::<String>::new()).is_none());
}

#[test]
fn shell_wraps_script() {
    let cmd = JobCommand::shell("exit 3");
    assert_eq!(cmd.program, "sh");
    assert_eq!(cmd.args, vec!["-c", "exit 3"]);
}

#[test]
fn display_quotes_args_with_whitespace() {
    let cmd = JobCommand::new("sh").arg("-c").arg("sleep 1").arg("");
    assert_eq!(cmd.to_string(), r#"sh -c "sleep 1" """#);
}

#[test]
fn builder_methods_accumulate() {
    let cmd = JobCommand::new("make")
        .args(["-j", "4"])
        .env("CC", "clang")
        .current_dir("/tmp");
    assert_eq!(cmd.args, vec!["-j", "4"]);
    assert_eq!(cmd.env, vec![("CC".to_string(), "clang".to_string())]);
    assert_eq!(cmd.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
}

#[test]
fn command_deserializes_with_defaults() {
    let cmd: JobCommand = serde_json::from_str(r#"{"program":"true"}"#).unwrap();
    assert_eq!(cmd, JobCommand::new("true"));
}

#[test]
fn process_info_exposes_fields() {
    let info = ProcessInfo::new(
        JobId::new(4),
        JobCommand::new("true"),
        StdRouting::Capture,
        StdRouting::Discard,
    );
    assert_eq!(info.id(), JobId::new(4));
    assert_eq!(info.command().program, "true");
    assert_eq!(info.stdout(), StdRouting::Capture);
    assert_eq!(info.stderr(), StdRouting::Discard);
}

#[test]
fn callback_action_defaults_to_continue() {
    assert_eq!(CallbackAction::default(), CallbackAction::Continue);
}
