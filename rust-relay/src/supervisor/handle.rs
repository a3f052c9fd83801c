//! Handle to one spawned child process.
//!
//! The OS child is owned by a waiter task, never by the handle. Killing goes
//! through the handle's cancellation token: the waiter terminates the process
//! tree, reaps it and reports the exit. Since the waiter stops signalling once
//! it has reaped the child, a recycled pid can never be hit.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::messages::ExitNotifier;
use crate::{Error, Result};

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

/// Supervisor-assigned process identity. Unlike a pid it is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    fn next() -> Self {
        Self(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// Downloader writing the media stream to stdout.
    Source,
    /// Compositor reading the stream from stdin and publishing it.
    Transform,
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Transform => f.write_str("transform"),
        }
    }
}

/// Stream ends captured at spawn time.
#[derive(Debug, Default)]
pub struct ProcessStreams {
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

#[derive(Debug)]
pub struct ProcessHandle {
    id: ProcessId,
    role: ProcessRole,
    pid: Option<u32>,
    spawned_at: Instant,
    kill: CancellationToken,
    terminated: bool,
}

impl ProcessHandle {
    pub(crate) fn new(role: ProcessRole, pid: Option<u32>, kill: CancellationToken) -> Self {
        Self {
            id: ProcessId::next(),
            role,
            pid,
            spawned_at: Instant::now(),
            kill,
            terminated: false,
        }
    }

    /// Spawn `command` and start watching it.
    ///
    /// The exit is reported through `notifier` exactly once, whether the
    /// process ended on its own or was terminated through this handle.
    pub fn spawn(
        role: ProcessRole,
        program: &str,
        mut command: Command,
        notifier: ExitNotifier,
    ) -> Result<(Self, ProcessStreams)> {
        let mut child = command
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn(program, e))?;

        let streams = ProcessStreams {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        let kill = CancellationToken::new();
        let handle = Self::new(role, child.id(), kill.clone());
        let (id, spawned_at) = (handle.id, handle.spawned_at);
        debug!(pair = %notifier.pair(), %role, %id, pid = ?handle.pid, "Spawned {}", program);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill.cancelled() => {
                    if let Err(e) = process_utils::terminate_tree(&mut child) {
                        warn!(%role, %id, error = %e, "Failed to signal process");
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(exit_status) => exit_status.code(),
                Err(e) => {
                    error!(%role, %id, error = %e, "Error waiting for process");
                    Some(-1)
                }
            };
            notifier.exited(role, id, code, spawned_at.elapsed());
        });

        Ok((handle, streams))
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Issue a kill without waiting for it to take effect.
    ///
    /// Returns `false` when the handle was already terminated, in which case
    /// no signal is sent.
    pub fn terminate(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        self.kill.cancel();
        debug!(role = %self.role, id = %self.id, pid = ?self.pid, "Kill requested");
        true
    }

    /// Record that the process exited on its own.
    pub fn mark_exited(&mut self) {
        self.terminated = true;
    }
}

/// Stdio layout for the downloader: stdout feeds the pipe.
pub fn source_stdio(command: &mut Command) {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
}

/// Stdio layout for the compositor: stdin is fed by the pipe.
pub fn transform_stdio(command: &mut Command) {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
}
