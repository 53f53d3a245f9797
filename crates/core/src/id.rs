// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker and job identifiers, and the id generation seam.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Process-wide unique identifier of a builder (128-bit, UUID formatted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// The all-zero id. Never handed out by a generator.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// First `n` hex characters, for compact log lines.
    pub fn short(&self, n: usize) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(n);
        s
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Error returned when a string is not a valid worker id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid worker id `{0}`")]
pub struct IdParseError(pub String);

impl FromStr for WorkerId {
    type Err = IdParseError;

    /// Accepts hyphenated, simple and braced forms (`{...}`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
        Uuid::parse_str(trimmed).map(Self).map_err(|_| IdParseError(s.to_string()))
    }
}

impl From<Uuid> for WorkerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of one job within a batch; also keys its process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Source of fresh worker ids.
///
/// The pool retries on collision, so an implementation is free to be random.
pub trait IdGen: Send + Sync + 'static {
    fn next(&self) -> WorkerId;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> WorkerId {
        WorkerId(Uuid::new_v4())
    }
}

/// Predictable ids `1, 2, 3, ...` (as u128 UUIDs). Clones share the counter.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Default)]
pub struct SequentialIdGen {
    counter: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

#[cfg(any(test, feature = "test-support"))]
impl SequentialIdGen {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl IdGen for SequentialIdGen {
    fn next(&self) -> WorkerId {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        WorkerId::from_u128(n as u128)
    }
}

/// Always yields the same id, for exercising collision handling.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug)]
pub struct FixedIdGen {
    id: WorkerId,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-support"))]
impl FixedIdGen {
    pub fn new(id: WorkerId) -> Self {
        Self { id, calls: std::sync::atomic::AtomicUsize::new(0) }
    }

    /// Number of ids generated so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl IdGen for FixedIdGen {
    fn next(&self) -> WorkerId {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.id
    }
}

impl<T: IdGen + ?Sized> IdGen for std::sync::Arc<T> {
    fn next(&self) -> WorkerId {
        (**self).next()
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
