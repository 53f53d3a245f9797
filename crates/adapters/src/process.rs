// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS process handle: spawn, stdio routing, wait with timeout, terminate.
//!
//! Piped streams are read by background tasks into bounded line buffers. A
//! full buffer stops the reader, which in turn lets the child's pipe fill up,
//! so whoever owns the handle must keep draining it (`wait`, `pump` or
//! `take_output`).

use abp_core::{ExitCondition, JobCommand, StdContent, StdRouting};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;

/// How long to keep reading buffered output after a process has exited.
/// Grandchildren that inherited the pipe can hold it open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables applied to every spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Lines buffered per piped stream before the reader stalls.
    pub buffer_lines: usize,
    /// Time between SIGTERM and SIGKILL when terminating.
    pub terminate_grace: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self { buffer_lines: 256, terminate_grace: Duration::from_millis(500) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn { command: String, source: std::io::Error },
}

/// Which standard stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

abp_core::simple_display! {
    Stream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// One line of child output, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub line: String,
}

/// Spawns processes. The seam the scheduler and the builder pool launch through.
pub trait ProcessLauncher: Send + Sync + 'static {
    fn launch(
        &self,
        command: &JobCommand,
        stdout: StdRouting,
        stderr: StdRouting,
    ) -> Result<ProcessHandle, LaunchError>;
}

/// Launches real OS processes.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
    options: LaunchOptions,
}

impl SystemLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(
        &self,
        command: &JobCommand,
        stdout: StdRouting,
        stderr: StdRouting,
    ) -> Result<ProcessHandle, LaunchError> {
        ProcessHandle::spawn(command, stdout, stderr, &self.options)
    }
}

impl<T: ProcessLauncher + ?Sized> ProcessLauncher for std::sync::Arc<T> {
    fn launch(
        &self,
        command: &JobCommand,
        stdout: StdRouting,
        stderr: StdRouting,
    ) -> Result<ProcessHandle, LaunchError> {
        (**self).launch(command, stdout, stderr)
    }
}

/// Launches real processes and remembers every command it was asked to run.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    inner: SystemLauncher,
    launched: std::sync::Arc<parking_lot::Mutex<Vec<JobCommand>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { inner: SystemLauncher::new(options), launched: Default::default() }
    }

    pub fn launched(&self) -> Vec<JobCommand> {
        self.launched.lock().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProcessLauncher for RecordingLauncher {
    fn launch(
        &self,
        command: &JobCommand,
        stdout: StdRouting,
        stderr: StdRouting,
    ) -> Result<ProcessHandle, LaunchError> {
        self.launched.lock().push(command.clone());
        self.inner.launch(command, stdout, stderr)
    }
}

/// Bounded line buffer fed by a background reader task.
struct StreamReader {
    stream: Stream,
    routing: StdRouting,
    rx: mpsc::Receiver<String>,
    retained: String,
    closed: bool,
}

impl StreamReader {
    fn spawn<R>(stream: Stream, routing: StdRouting, source: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            let mut reader = BufReader::new(source);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(%stream, error = %e, "stdio reader stopped");
                        break;
                    }
                }
            }
        });
        Self { stream, routing, rx, retained: String::new(), closed: false }
    }

    fn absorb(&mut self, raw: String) -> OutputLine {
        if self.routing == StdRouting::Capture {
            self.retained.push_str(&raw);
        }
        let line = raw.strip_suffix('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        OutputLine { stream: self.stream, line: line.unwrap_or(&raw).to_string() }
    }

    fn try_drain(&mut self, out: &mut Vec<OutputLine>) {
        while !self.closed {
            match self.rx.try_recv() {
                Ok(raw) => {
                    let line = self.absorb(raw);
                    out.push(line);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
    }
}

fn is_open(slot: &Option<StreamReader>) -> bool {
    slot.as_ref().is_some_and(|r| !r.closed)
}

/// Next raw line from a stream; never resolves once the stream is closed.
async fn next_line(slot: &mut Option<StreamReader>) -> Option<String> {
    match slot {
        Some(reader) if !reader.closed => reader.rx.recv().await,
        _ => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Return code for an exit status; `128 + signal` when killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

enum WaitEvent {
    Exited(std::io::Result<ExitStatus>),
    Line(Stream, Option<String>),
    Deadline,
}

/// One running (or finished) OS process.
pub struct ProcessHandle {
    label: String,
    child: Child,
    pid: Option<u32>,
    stdout: Option<StreamReader>,
    stderr: Option<StreamReader>,
    return_code: Option<i32>,
    terminated: bool,
    terminate_grace: Duration,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("return_code", &self.return_code)
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl ProcessHandle {
    /// Spawn `command` with the given stream routing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        command: &JobCommand,
        stdout: StdRouting,
        stderr: StdRouting,
        options: &LaunchOptions,
    ) -> Result<Self, LaunchError> {
        if command.program.trim().is_empty() {
            return Err(LaunchError::EmptyCommand);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(stdio_for(stdout))
            .stderr(stdio_for(stderr))
            .kill_on_drop(true);
        if let Some(ref dir) = command.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|source| LaunchError::Spawn { command: command.to_string(), source })?;
        let pid = child.id();

        let stdout_reader = child
            .stdout
            .take()
            .map(|out| StreamReader::spawn(Stream::Stdout, stdout, out, options.buffer_lines));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| StreamReader::spawn(Stream::Stderr, stderr, err, options.buffer_lines));

        tracing::debug!(pid, command = %command, "process spawned");

        Ok(Self {
            label: command.program.clone(),
            child,
            pid,
            stdout: stdout_reader,
            stderr: stderr_reader,
            return_code: None,
            terminated: false,
            terminate_grace: options.terminate_grace,
        })
    }

    /// Program name, for log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// OS process id captured at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Return code once the process has exited.
    pub fn return_code(&self) -> Option<i32> {
        self.return_code
    }

    /// Whether the process has been terminated by this handle.
    pub fn was_terminated(&self) -> bool {
        self.terminated
    }

    /// Non-blocking exit check.
    pub fn has_exited(&mut self) -> bool {
        if self.return_code.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.return_code = Some(exit_code(status));
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(process = %self.label, error = %e, "failed to poll process status");
                false
            }
        }
    }

    /// Drain whatever output is buffered right now without blocking.
    pub fn pump(&mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        if let Some(reader) = self.stdout.as_mut() {
            reader.try_drain(&mut lines);
        }
        if let Some(reader) = self.stderr.as_mut() {
            reader.try_drain(&mut lines);
        }
        lines
    }

    /// Wait for the process to exit, draining its output meanwhile.
    ///
    /// When `timeout` elapses first the process is terminated and
    /// [`ExitCondition::Timeout`] is returned.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> ExitCondition {
        if self.return_code.is_some() {
            return self.settled_condition();
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let event = tokio::select! {
                status = self.child.wait() => WaitEvent::Exited(status),
                line = next_line(&mut self.stdout) => WaitEvent::Line(Stream::Stdout, line),
                line = next_line(&mut self.stderr) => WaitEvent::Line(Stream::Stderr, line),
                _ = sleep_until(deadline) => WaitEvent::Deadline,
            };

            match event {
                WaitEvent::Exited(Ok(status)) => {
                    self.return_code = Some(exit_code(status));
                    return self.settled_condition();
                }
                WaitEvent::Exited(Err(e)) => {
                    tracing::warn!(process = %self.label, error = %e, "failed to wait on process");
                    self.terminate().await;
                    return ExitCondition::Terminated;
                }
                WaitEvent::Line(stream, line) => self.on_line(stream, line),
                WaitEvent::Deadline => {
                    tracing::debug!(process = %self.label, pid = self.pid, "process timed out");
                    self.terminate().await;
                    return ExitCondition::Timeout;
                }
            }
        }
    }

    /// Stop the process: SIGTERM, then SIGKILL after the grace period.
    pub async fn terminate(&mut self) {
        if self.has_exited() {
            return;
        }
        self.terminated = true;

        #[cfg(unix)]
        {
            if self.send_sigterm() {
                if let Ok(Ok(status)) =
                    tokio::time::timeout(self.terminate_grace, self.child.wait()).await
                {
                    self.return_code = Some(exit_code(status));
                    return;
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            tracing::warn!(process = %self.label, error = %e, "failed to kill process");
        }
        self.return_code = match self.child.try_wait() {
            Ok(Some(status)) => Some(exit_code(status)),
            _ => Some(-1),
        };
    }

    /// Collect the captured output. Call after the process has exited.
    pub async fn take_output(&mut self) -> StdContent {
        let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, self.drain_remaining()).await;
        if drained.is_err() {
            tracing::debug!(process = %self.label, "output still open after exit, truncating");
            self.pump();
        }
        StdContent {
            stdout: take_retained(&mut self.stdout),
            stderr: take_retained(&mut self.stderr),
        }
    }

    async fn drain_remaining(&mut self) {
        while is_open(&self.stdout) || is_open(&self.stderr) {
            let (stream, line) = tokio::select! {
                line = next_line(&mut self.stdout) => (Stream::Stdout, line),
                line = next_line(&mut self.stderr) => (Stream::Stderr, line),
            };
            self.on_line(stream, line);
        }
    }

    fn on_line(&mut self, stream: Stream, raw: Option<String>) {
        let slot = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        let Some(reader) = slot.as_mut() else { return };
        match raw {
            Some(raw) => {
                let line = reader.absorb(raw);
                if reader.routing == StdRouting::Stream {
                    tracing::debug!(process = %self.label, %stream, "{}", line.line);
                }
            }
            None => reader.closed = true,
        }
    }

    fn settled_condition(&self) -> ExitCondition {
        if self.terminated {
            ExitCondition::Terminated
        } else {
            ExitCondition::Graceful
        }
    }

    #[cfg(unix)]
    fn send_sigterm(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match self.child.id() {
            Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
            None => false,
        }
    }
}

fn stdio_for(routing: StdRouting) -> Stdio {
    match routing {
        StdRouting::Discard => Stdio::null(),
        StdRouting::Capture | StdRouting::Stream => Stdio::piped(),
        StdRouting::Inherit => Stdio::inherit(),
    }
}

fn take_retained(slot: &mut Option<StreamReader>) -> Option<String> {
    slot.as_mut()
        .filter(|r| r.routing == StdRouting::Capture)
        .map(|r| std::mem::take(&mut r.retained))
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
