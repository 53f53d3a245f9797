// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use abp_core::{Purpose, WorkerId};
use serde::{Deserialize, Serialize};

/// Handshake sent by a builder right after it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderHello {
    /// Id the builder was launched with (`-id=`), or a fresh one for
    /// externally started builders.
    pub builder_id: WorkerId,
    pub platform: String,
}

/// Pool's answer to [`BuilderHello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderHelloAck {
    pub accepted: bool,
    pub builder_id: WorkerId,
}

/// One unit of work dispatched to a connected builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Caller-chosen key, echoed back in the response and recorded in the
    /// builder's debug trace.
    pub job_key: String,
    pub purpose: Purpose,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Builder's answer to a [`JobRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_key: String,
    pub succeeded: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Every frame on a builder connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    BuilderHello(BuilderHello),
    BuilderHelloAck(BuilderHelloAck),
    Job(JobRequest),
    JobResult(JobResponse),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::BuilderHello(_) => "builder_hello",
            Message::BuilderHelloAck(_) => "builder_hello_ack",
            Message::Job(_) => "job",
            Message::JobResult(_) => "job_result",
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
