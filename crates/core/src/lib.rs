// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! abp-core: data model shared by the builder pool and the job scheduler

pub mod macros;

pub mod clock;
pub mod id;
pub mod job;
pub mod process;
pub mod purpose;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
#[cfg(any(test, feature = "test-support"))]
pub use id::{FixedIdGen, SequentialIdGen};
pub use id::{IdGen, IdParseError, JobId, UuidIdGen, WorkerId};
pub use job::{CommandJob, Job, JobInfo, JobMeta, JobResult};
pub use process::{
    CallbackAction, ExitCondition, JobCommand, LaunchResult, ProcessInfo, ProcessSchedulerResult,
    StdContent, StdRouting,
};
pub use purpose::{Purpose, PurposeParseError};
pub use worker::{ConnectionId, WorkerState};
