// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder pool: hands out builders by purpose, starting new ones on demand.

use std::sync::Arc;

use abp_adapters::{ConnectionManager, ProcessLauncher, SystemLauncher};
use abp_core::{ConnectionId, IdGen, Purpose, UuidIdGen, WorkerId, WorkerState};
use abp_wire::{BuilderHello, BuilderHelloAck, Message};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::{Builder, BuilderRef};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::registry::BuilderList;

pub struct BuilderManager {
    config: PoolConfig,
    registry: Arc<Mutex<BuilderList>>,
    connections: Arc<dyn ConnectionManager>,
    launcher: Arc<dyn ProcessLauncher>,
    ids: Arc<dyn IdGen>,
    quit: CancellationToken,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

impl BuilderManager {
    /// Pool launching real builder processes with random ids.
    ///
    /// Must be called from within a tokio runtime; the idle pump task starts
    /// immediately.
    pub fn new(config: PoolConfig, connections: Arc<dyn ConnectionManager>) -> Self {
        let launcher = Arc::new(SystemLauncher::new(config.launch_options()));
        Self::with_parts(
            config,
            connections,
            launcher,
            Arc::new(UuidIdGen),
            CancellationToken::new(),
        )
    }

    /// Pool with injected collaborators. Cancelling `quit` has the same
    /// effect on new allocations and the pump task as [`shutdown`](Self::shutdown).
    pub fn with_parts(
        config: PoolConfig,
        connections: Arc<dyn ConnectionManager>,
        launcher: Arc<dyn ProcessLauncher>,
        ids: Arc<dyn IdGen>,
        quit: CancellationToken,
    ) -> Self {
        let registry = Arc::new(Mutex::new(BuilderList::new()));
        let pump_task = tokio::spawn(pump_idle_builders(
            Arc::clone(&registry),
            config.idle_pump_delay,
            quit.clone(),
        ));
        Self {
            config,
            registry,
            connections,
            launcher,
            ids,
            quit,
            pump_task: Mutex::new(Some(pump_task)),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.quit.is_cancelled()
    }

    /// Check out a builder for `purpose`.
    ///
    /// Reuses a free builder unless `purpose` is [`Purpose::Registration`];
    /// otherwise registers and starts a new one. Blocks only for the new
    /// builder's startup handshake.
    pub async fn get_builder(&self, purpose: Purpose) -> Result<BuilderRef, PoolError> {
        if self.is_shutting_down() {
            return Err(PoolError::Shutdown);
        }

        let builder_ref = {
            let mut list = self.registry.lock();
            if purpose.is_reusable() {
                if let Some(found) = list.get_first(purpose) {
                    tracing::debug!(builder_id = %found.id(), %purpose, "reusing builder");
                    return Ok(found);
                }
            }
            self.add_new_builder(&mut list, purpose)?
        };

        let id = builder_ref.id();
        tracing::info!(builder_id = %id, %purpose, "starting builder");
        match builder_ref.builder().start(&self.config, self.launcher.as_ref(), &self.quit).await {
            Ok(()) => {
                tracing::info!(builder_id = %id, %purpose, "builder connected");
                Ok(builder_ref)
            }
            Err(reason) => {
                {
                    let mut list = self.registry.lock();
                    drop(builder_ref);
                    list.remove_by_uuid(id);
                }
                tracing::error!(builder_id = %id, %purpose, %reason, "builder failed to start");
                Err(PoolError::StartFailure { builder_id: id, purpose, reason })
            }
        }
    }

    /// Register a new builder under a fresh id, checked out to the caller.
    fn add_new_builder(
        &self,
        list: &mut BuilderList,
        purpose: Purpose,
    ) -> Result<BuilderRef, PoolError> {
        let attempts = self.config.id_collision_retries;
        for _ in 0..attempts {
            let id = self.ids.next();
            if id.is_nil() || list.contains(id) {
                tracing::debug!(builder_id = %id, "builder id collision, retrying");
                continue;
            }
            let builder = Arc::new(Builder::managed(
                id,
                purpose,
                Arc::clone(&self.connections),
                self.config.retries_for_network_error,
            ));
            list.add_builder(Arc::clone(&builder));
            return Ok(BuilderRef::adopt(builder));
        }
        tracing::error!(attempts, %purpose, "failed to generate a unique builder id");
        Err(PoolError::IdCollision { attempts })
    }

    /// Handle the hello frame a builder sends right after connecting.
    ///
    /// Returns the id of the builder now bound to `conn`, or `None` if the
    /// ping was rejected.
    pub async fn incoming_builder_ping(
        &self,
        conn: ConnectionId,
        payload: &[u8],
    ) -> Option<WorkerId> {
        let hello: BuilderHello = match abp_wire::decode::<Message>(payload) {
            Ok(Message::BuilderHello(hello)) => hello,
            Ok(other) => {
                tracing::warn!(%conn, message = other.name(), "expected builder_hello");
                return None;
            }
            Err(e) => {
                tracing::error!(
                    %conn,
                    error = %e,
                    "could not decode builder ping; the builder was probably built from a \
                     different version, rebuild it against this pool"
                );
                return None;
            }
        };
        let id = hello.builder_id;

        {
            let mut list = self.registry.lock();
            if !list.contains(id) {
                if !self.config.allow_unmanaged_builder_connections {
                    tracing::warn!(
                        builder_id = %id,
                        %conn,
                        "rejected ping from unknown builder; \
                         unmanaged builder connections are disabled"
                    );
                    return None;
                }
                let builder = Builder::external(
                    id,
                    Purpose::ProcessJob,
                    Arc::clone(&self.connections),
                    self.config.retries_for_network_error,
                );
                list.add_builder(Arc::new(builder));
                tracing::info!(
                    builder_id = %id,
                    %conn,
                    platform = %hello.platform,
                    "registered unmanaged builder"
                );
            }

            if !list.connect(id, conn) {
                let existing = list.find(id).and_then(|b| b.connection());
                tracing::error!(
                    builder_id = %id,
                    %conn,
                    existing = ?existing,
                    "builder pinged again on a new connection; keeping the existing one"
                );
                return None;
            }
        }

        tracing::info!(builder_id = %id, %conn, "builder connected");
        let ack = Message::BuilderHelloAck(BuilderHelloAck { accepted: true, builder_id: id });
        if let Err(e) = self.connections.send(conn, ack).await {
            tracing::warn!(
                builder_id = %id,
                %conn,
                error = %e,
                "failed to acknowledge builder ping"
            );
        }
        Some(id)
    }

    /// Forget the builder bound to `conn` and stop its process.
    pub async fn connection_lost(&self, conn: ConnectionId) -> Option<WorkerId> {
        let builder = {
            let mut list = self.registry.lock();
            let builder = list.find_by_connection(conn)?;
            list.remove_by_connection_id(conn);
            builder
        };
        builder.disconnect();
        tracing::warn!(builder_id = %builder.id(), %conn, "lost connection to builder");
        builder.terminate_process().await;
        Some(builder.id())
    }

    pub fn builder_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// `(id, purpose, state)` of every registered builder, sorted by id.
    pub fn builder_summaries(&self) -> Vec<(WorkerId, Purpose, WorkerState)> {
        self.registry.lock().builders().iter().map(|b| (b.id(), b.purpose(), b.state())).collect()
    }

    /// Stop allocating, log each builder's job trace, stop the pump task and
    /// terminate the builder processes.
    pub async fn shutdown(&self) {
        self.quit.cancel();

        let builders = self.registry.lock().builders();
        for builder in &builders {
            let trace = builder.debug_trace();
            tracing::info!(
                builder_id = %builder.id(),
                purpose = %builder.purpose(),
                jobs = trace.len(),
                "builder job trace: [{}]",
                trace.join(", ")
            );
        }

        let task = self.pump_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "idle pump task failed");
            }
        }

        for builder in &builders {
            builder.terminate_process().await;
        }
    }
}

impl Drop for BuilderManager {
    fn drop(&mut self) {
        self.quit.cancel();
    }
}

/// Periodically drain idle builders' output so their pipes never fill up.
async fn pump_idle_builders(
    registry: Arc<Mutex<BuilderList>>,
    delay: std::time::Duration,
    quit: CancellationToken,
) {
    let mut ticker = tokio::time::interval(delay.max(std::time::Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = quit.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let mut list = registry.lock();
        list.pump_idle_builders();
        for id in list.remove_retired() {
            tracing::info!(builder_id = %id, "removed retired builder");
        }
    }
    tracing::debug!("idle pump stopped");
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
