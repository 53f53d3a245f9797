// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! abp-adapters: OS processes and builder connections

pub mod process;
pub mod transport;

pub use process::{
    LaunchError, LaunchOptions, OutputLine, ProcessHandle, ProcessLauncher, Stream, SystemLauncher,
};
#[cfg(any(test, feature = "test-support"))]
pub use process::RecordingLauncher;
pub use transport::{ConnectionManager, TransportError};
#[cfg(any(test, feature = "test-support"))]
pub use transport::FakeConnectionManager;
