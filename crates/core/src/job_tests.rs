// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    success     = { ExitCondition::Graceful, 0, JobResult::Success },
    failure     = { ExitCondition::Graceful, 1, JobResult::ExecutedWithFailure },
    negative    = { ExitCondition::Graceful, -1, JobResult::ExecutedWithFailure },
    timed_out   = { ExitCondition::Timeout, 0, JobResult::Timeout },
    terminated  = { ExitCondition::Terminated, 137, JobResult::Terminated },
)]
fn classify_exit(condition: ExitCondition, code: i32, expected: JobResult) {
    assert_eq!(JobResult::from_exit(condition, code), expected);
}

#[test]
fn meta_records_launch_then_exit() {
    let start = Instant::now();
    let mut meta = JobMeta::default();
    meta.mark_launched(start, 5_000);
    meta.mark_exited(ExitCondition::Graceful, 0, start + Duration::from_millis(250));

    assert_eq!(meta.start_time, Some(start));
    assert_eq!(meta.started_at_ms, Some(5_000));
    assert_eq!(meta.duration, Some(Duration::from_millis(250)));
    assert_eq!(meta.return_code, Some(0));
    assert_eq!(meta.result, Some(JobResult::Success));
}

#[test]
fn launch_failure_leaves_timing_empty() {
    let mut meta = JobMeta::default();
    meta.mark_launch_failed();
    assert_eq!(meta.result, Some(JobResult::FailedToExecute));
    assert!(meta.start_time.is_none());
    assert!(meta.duration.is_none());
    assert!(meta.return_code.is_none());
}

#[test]
fn ran_to_completion_only_for_graceful_results() {
    assert!(JobResult::Success.ran_to_completion());
    assert!(JobResult::ExecutedWithFailure.ran_to_completion());
    assert!(!JobResult::FailedToExecute.ran_to_completion());
    assert!(!JobResult::Terminated.ran_to_completion());
    assert!(!JobResult::Timeout.ran_to_completion());
}

#[test]
fn job_exposes_parts() {
    let info = CommandJob::new(9, crate::JobCommand::new("true"));
    let job: Job<_, String> = Job::new(info.clone(), JobMeta::default(), Some("out".into()));
    assert_eq!(job.id(), JobId::new(9));
    assert_eq!(job.payload().map(String::as_str), Some("out"));
    assert_eq!(job.result(), None);
    let (back, meta, payload) = job.into_parts();
    assert_eq!(back, info);
    assert!(meta.is_empty());
    assert_eq!(payload.as_deref(), Some("out"));
}

#[test]
fn result_display_is_snake_case() {
    assert_eq!(JobResult::ExecutedWithFailure.to_string(), "executed_with_failure");
    assert_eq!(JobResult::FailedToExecute.to_string(), "failed_to_execute");
}

fn any_condition() -> impl proptest::strategy::Strategy<Value = ExitCondition> {
    proptest::prop_oneof![
        proptest::strategy::Just(ExitCondition::Graceful),
        proptest::strategy::Just(ExitCondition::Timeout),
        proptest::strategy::Just(ExitCondition::Terminated),
    ]
}

proptest::proptest! {
    #[test]
    fn only_graceful_exits_run_to_completion(
        condition in any_condition(),
        code in proptest::num::i32::ANY,
    ) {
        let result = JobResult::from_exit(condition, code);
        proptest::prop_assert_eq!(result.ran_to_completion(), condition == ExitCondition::Graceful);
        let graceful_zero = condition == ExitCondition::Graceful && code == 0;
        proptest::prop_assert_eq!(result == JobResult::Success, graceful_zero);
        proptest::prop_assert_ne!(result, JobResult::FailedToExecute);
    }
}
