// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One out-of-process builder and the checkout handle that guards it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use abp_adapters::{ConnectionManager, ProcessHandle, ProcessLauncher};
use abp_core::{ConnectionId, JobCommand, Purpose, StdRouting, WorkerId, WorkerState};
use abp_wire::{JobRequest, JobResponse, Message};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;

/// How often a builder's output is drained while it runs a job.
const BUSY_PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// How a job dispatched to a builder ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderRunJobOutcome {
    Ok(JobResponse),
    /// The connection dropped; the job may be retried.
    LostConnection,
    /// The builder process died or was killed for overrunning the job timeout.
    ProcessTerminated,
    JobCancelled,
    /// The builder answered with something other than this job's result.
    ResponseFailure(String),
}

#[derive(Debug, Default)]
struct Link {
    connection: Option<ConnectionId>,
    disconnected: bool,
    served: bool,
    /// Job keys dispatched to this builder, oldest first.
    trace: Vec<String>,
}

/// A builder process (or externally started builder) dedicated to one purpose.
pub struct Builder {
    id: WorkerId,
    purpose: Purpose,
    managed: bool,
    retries_for_network_error: u32,
    busy: AtomicBool,
    link: Mutex<Link>,
    process: tokio::sync::Mutex<Option<ProcessHandle>>,
    connections: Arc<dyn ConnectionManager>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("id", &self.id)
            .field("purpose", &self.purpose)
            .field("managed", &self.managed)
            .field("state", &self.state())
            .finish()
    }
}

impl Builder {
    /// A builder the pool will launch itself. Created checked out, so nothing
    /// else can claim it while it starts.
    pub(crate) fn managed(
        id: WorkerId,
        purpose: Purpose,
        connections: Arc<dyn ConnectionManager>,
        retries_for_network_error: u32,
    ) -> Self {
        Self::new(id, purpose, true, connections, retries_for_network_error)
    }

    /// A builder that connected on its own.
    pub(crate) fn external(
        id: WorkerId,
        purpose: Purpose,
        connections: Arc<dyn ConnectionManager>,
        retries_for_network_error: u32,
    ) -> Self {
        Self::new(id, purpose, false, connections, retries_for_network_error)
    }

    fn new(
        id: WorkerId,
        purpose: Purpose,
        managed: bool,
        connections: Arc<dyn ConnectionManager>,
        retries_for_network_error: u32,
    ) -> Self {
        Self {
            id,
            purpose,
            managed,
            retries_for_network_error,
            busy: AtomicBool::new(managed),
            link: Mutex::new(Link::default()),
            process: tokio::sync::Mutex::new(None),
            connections,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// Whether this pool launched the builder's process.
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.link.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        let link = self.link.lock();
        if link.disconnected {
            WorkerState::Disconnected
        } else if link.connection.is_none() {
            WorkerState::Unconnected
        } else if self.is_busy() {
            WorkerState::Busy
        } else if link.served {
            WorkerState::Idle
        } else {
            WorkerState::Connected
        }
    }

    /// Job keys dispatched so far, oldest first.
    pub fn debug_trace(&self) -> Vec<String> {
        self.link.lock().trace.clone()
    }

    /// Claim the builder if it is connected and free.
    pub(crate) fn try_claim(&self) -> bool {
        let link = self.link.lock();
        if link.disconnected || link.connection.is_none() {
            return false;
        }
        self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Bind the connection a builder pinged on. False if it already has one.
    pub(crate) fn connect(&self, conn: ConnectionId) -> bool {
        let mut link = self.link.lock();
        if link.connection.is_some() || link.disconnected {
            return false;
        }
        link.connection = Some(conn);
        true
    }

    /// Mark the builder unusable. Its registry entry is pruned separately.
    pub(crate) fn disconnect(&self) {
        let mut link = self.link.lock();
        link.disconnected = true;
        link.connection = None;
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.link.lock().disconnected
    }

    fn record_job(&self, key: &str) {
        self.link.lock().trace.push(key.to_string());
    }

    fn release(&self) {
        self.link.lock().served = true;
        self.busy.store(false, Ordering::Release);
    }

    /// Launch the builder process and wait for it to ping back.
    ///
    /// Runs `<program> <args...> -id=<id> -task=<task> -platform=<platform>`
    /// and polls until the connection is bound, the process exits, `quit`
    /// fires or the startup timeout elapses.
    pub(crate) async fn start(
        &self,
        config: &PoolConfig,
        launcher: &dyn ProcessLauncher,
        quit: &CancellationToken,
    ) -> Result<(), String> {
        let command = JobCommand::new(&config.builder_program)
            .args(config.builder_args.iter().cloned())
            .arg(format!("-id={}", self.id))
            .arg(format!("-task={}", self.purpose.task_arg()))
            .arg(format!("-platform={}", config.platform));

        let mut handle = launcher
            .launch(&command, StdRouting::Stream, StdRouting::Stream)
            .map_err(|e| e.to_string())?;
        tracing::info!(
            builder_id = %self.id,
            pid = handle.pid(),
            purpose = %self.purpose,
            "builder launched"
        );

        let deadline = tokio::time::Instant::now() + config.startup_timeout;
        loop {
            self.log_output(&mut handle);
            if self.is_connected() {
                break;
            }
            if handle.has_exited() {
                self.log_output(&mut handle);
                let code = handle.return_code().unwrap_or(-1);
                return Err(format!("builder exited with code {code} before connecting"));
            }
            if quit.is_cancelled() {
                handle.terminate().await;
                return Err("shutdown requested while starting".to_string());
            }
            if tokio::time::Instant::now() >= deadline {
                handle.terminate().await;
                return Err(format!(
                    "builder did not connect within {}ms",
                    config.startup_timeout.as_millis()
                ));
            }
            tokio::select! {
                _ = tokio::time::sleep(config.startup_poll) => {}
                _ = quit.cancelled() => {}
            }
        }

        *self.process.lock().await = Some(handle);
        Ok(())
    }

    /// Drain the builder's buffered output into the log without blocking.
    /// Skipped while someone else holds the process.
    pub fn pump(&self) -> usize {
        let Ok(mut process) = self.process.try_lock() else { return 0 };
        match process.as_mut() {
            Some(handle) => self.log_output(handle),
            None => 0,
        }
    }

    fn log_output(&self, handle: &mut ProcessHandle) -> usize {
        let lines = handle.pump();
        for line in &lines {
            tracing::debug!(builder_id = %self.id, stream = %line.stream, "{}", line.line);
        }
        lines.len()
    }

    pub(crate) async fn process_exited(&self) -> bool {
        match self.process.lock().await.as_mut() {
            Some(handle) => handle.has_exited(),
            None => false,
        }
    }

    /// Terminate the builder's process, if this pool owns one.
    pub async fn terminate_process(&self) {
        if let Some(handle) = self.process.lock().await.as_mut() {
            handle.terminate().await;
            tracing::info!(
                builder_id = %self.id,
                return_code = handle.return_code(),
                "builder process terminated"
            );
        }
    }
}

/// Checked-out builder. Dropping it returns the builder to the pool.
pub struct BuilderRef {
    builder: Arc<Builder>,
}

impl std::fmt::Debug for BuilderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BuilderRef").field(&self.builder.id).finish()
    }
}

impl BuilderRef {
    /// Claim `builder`, or `None` if it is busy or not connected.
    pub(crate) fn claim(builder: &Arc<Builder>) -> Option<Self> {
        builder.try_claim().then(|| Self { builder: Arc::clone(builder) })
    }

    /// Wrap a builder created already checked out.
    pub(crate) fn adopt(builder: Arc<Builder>) -> Self {
        Self { builder }
    }

    pub fn id(&self) -> WorkerId {
        self.builder.id
    }

    pub fn purpose(&self) -> Purpose {
        self.builder.purpose
    }

    pub fn builder(&self) -> &Arc<Builder> {
        &self.builder
    }

    /// Send one job to the builder and wait for its result.
    ///
    /// On timeout or cancellation the builder process is terminated and the
    /// builder retired; it will not be handed out again.
    pub async fn run_job(
        &self,
        request: JobRequest,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> BuilderRunJobOutcome {
        let builder = &self.builder;
        let Some(conn) = builder.connection() else {
            tracing::warn!(
                builder_id = %builder.id,
                job = %request.job_key,
                "builder has no connection"
            );
            return BuilderRunJobOutcome::LostConnection;
        };

        let key = request.job_key.clone();
        builder.record_job(&key);
        tracing::debug!(builder_id = %builder.id, %conn, job = %key, "dispatching job");

        let exchange =
            tokio::time::timeout(timeout, builder.connections.request(conn, Message::Job(request)));
        tokio::pin!(exchange);
        // The idle pump skips checked-out builders; keep the pipes moving here.
        let mut pump = tokio::time::interval(BUSY_PUMP_INTERVAL);
        pump.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let reply = loop {
            tokio::select! {
                reply = &mut exchange => break Some(reply),
                _ = cancelled(cancel) => break None,
                _ = pump.tick() => {
                    builder.pump();
                }
            }
        };

        let reply = match reply {
            Some(Ok(reply)) => reply,
            Some(Err(_elapsed)) => {
                tracing::warn!(
                    builder_id = %builder.id,
                    job = %key,
                    timeout_ms = timeout.as_millis() as u64,
                    "job timed out, terminating builder"
                );
                self.retire().await;
                return BuilderRunJobOutcome::ProcessTerminated;
            }
            None => {
                tracing::info!(
                    builder_id = %builder.id,
                    job = %key,
                    "job cancelled, terminating builder"
                );
                self.retire().await;
                return BuilderRunJobOutcome::JobCancelled;
            }
        };

        match reply {
            Ok(Message::JobResult(response)) if response.job_key == key => {
                BuilderRunJobOutcome::Ok(response)
            }
            Ok(Message::JobResult(response)) => BuilderRunJobOutcome::ResponseFailure(format!(
                "expected result for {key}, got {}",
                response.job_key
            )),
            Ok(other) => BuilderRunJobOutcome::ResponseFailure(format!(
                "expected job_result, got {}",
                other.name()
            )),
            Err(e) if e.is_connection_loss() => {
                if builder.process_exited().await {
                    tracing::warn!(
                        builder_id = %builder.id,
                        job = %key,
                        "builder process exited during job"
                    );
                    builder.disconnect();
                    BuilderRunJobOutcome::ProcessTerminated
                } else {
                    tracing::warn!(
                        builder_id = %builder.id,
                        job = %key,
                        error = %e,
                        "lost connection to builder"
                    );
                    BuilderRunJobOutcome::LostConnection
                }
            }
            Err(e) => BuilderRunJobOutcome::ResponseFailure(e.to_string()),
        }
    }

    /// [`run_job`](Self::run_job), retried on [`BuilderRunJobOutcome::LostConnection`]
    /// up to the pool's `retries_for_network_error`.
    pub async fn run_job_with_retry(
        &self,
        request: JobRequest,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> BuilderRunJobOutcome {
        let mut attempt = 0;
        loop {
            let outcome = self.run_job(request.clone(), timeout, cancel).await;
            if outcome != BuilderRunJobOutcome::LostConnection
                || attempt >= self.builder.retries_for_network_error
            {
                return outcome;
            }
            attempt += 1;
            tracing::info!(
                builder_id = %self.builder.id,
                job = %request.job_key,
                attempt,
                "retrying job"
            );
        }
    }

    async fn retire(&self) {
        self.builder.disconnect();
        self.builder.terminate_process().await;
    }
}

impl Drop for BuilderRef {
    fn drop(&mut self) {
        self.builder.release();
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
