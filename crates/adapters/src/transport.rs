// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder connection seam.
//!
//! The socket layer that accepts builders lives outside this crate; the pool
//! only needs to address a connection by id, send it frames and wait for
//! replies. Implementations over a byte stream frame it with
//! `abp_wire::read_frame` and `abp_wire::write_frame`.

use abp_core::ConnectionId;
use abp_wire::{Message, ProtocolError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("connection {0} lost")]
    Disconnected(ConnectionId),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Whether the peer went away, as opposed to a malformed exchange.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, TransportError::UnknownConnection(_) | TransportError::Disconnected(_))
    }
}

/// Live builder connections, addressed by [`ConnectionId`].
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// Send a frame without waiting for a reply.
    async fn send(&self, conn: ConnectionId, message: Message) -> Result<(), TransportError>;

    /// Send a frame and wait for the peer's reply.
    async fn request(&self, conn: ConnectionId, message: Message)
        -> Result<Message, TransportError>;

    fn is_connected(&self, conn: ConnectionId) -> bool;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeConnectionManager;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ConnectionManager, TransportError};
    use abp_core::ConnectionId;
    use abp_wire::{JobResponse, Message};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    type Responder = Arc<dyn Fn(ConnectionId, &Message) -> Message + Send + Sync>;

    #[derive(Default)]
    struct FakeState {
        open: HashSet<ConnectionId>,
        sent: Vec<(ConnectionId, Message)>,
        fail_requests: usize,
        response_delay: Option<Duration>,
        responder: Option<Responder>,
    }

    /// In-memory connections for tests.
    ///
    /// Job requests are answered with a successful [`JobResponse`] unless a
    /// responder is installed; anything else is echoed back.
    #[derive(Clone, Default)]
    pub struct FakeConnectionManager {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeConnectionManager {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn connect(&self, conn: ConnectionId) {
            self.inner.lock().open.insert(conn);
        }

        pub fn disconnect(&self, conn: ConnectionId) {
            self.inner.lock().open.remove(&conn);
        }

        /// Every frame sent so far, requests included.
        pub fn sent(&self) -> Vec<(ConnectionId, Message)> {
            self.inner.lock().sent.clone()
        }

        /// Make the next `n` requests fail as if the connection dropped.
        pub fn fail_next_requests(&self, n: usize) {
            self.inner.lock().fail_requests = n;
        }

        /// Delay every reply; requests still fail if the connection closes meanwhile.
        pub fn set_response_delay(&self, delay: Duration) {
            self.inner.lock().response_delay = Some(delay);
        }

        pub fn set_responder<F>(&self, responder: F)
        where
            F: Fn(ConnectionId, &Message) -> Message + Send + Sync + 'static,
        {
            self.inner.lock().responder = Some(Arc::new(responder));
        }
    }

    #[async_trait]
    impl ConnectionManager for FakeConnectionManager {
        async fn send(&self, conn: ConnectionId, message: Message) -> Result<(), TransportError> {
            let mut state = self.inner.lock();
            if !state.open.contains(&conn) {
                return Err(TransportError::UnknownConnection(conn));
            }
            state.sent.push((conn, message));
            Ok(())
        }

        async fn request(
            &self,
            conn: ConnectionId,
            message: Message,
        ) -> Result<Message, TransportError> {
            let (delay, responder) = {
                let mut state = self.inner.lock();
                if !state.open.contains(&conn) {
                    return Err(TransportError::UnknownConnection(conn));
                }
                state.sent.push((conn, message.clone()));
                if state.fail_requests > 0 {
                    state.fail_requests -= 1;
                    return Err(TransportError::Disconnected(conn));
                }
                (state.response_delay, state.responder.clone())
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
                if !self.is_connected(conn) {
                    return Err(TransportError::Disconnected(conn));
                }
            }

            Ok(match (responder, message) {
                (Some(respond), message) => respond(conn, &message),
                (None, Message::Job(request)) => Message::JobResult(JobResponse {
                    job_key: request.job_key,
                    succeeded: true,
                    payload: serde_json::Value::Null,
                }),
                (None, other) => other,
            })
        }

        fn is_connected(&self, conn: ConnectionId) -> bool {
            self.inner.lock().open.contains(&conn)
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
