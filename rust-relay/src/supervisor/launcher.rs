//! Spawning of the {source, transform} pair.
//!
//! The supervisor builds a [`LaunchPlan`] and hands it to a [`ProcessLauncher`].
//! [`CommandLauncher`] spawns real OS processes and wires them together.

use std::time::Duration;

use tracing::{debug, warn};

use super::handle::{ProcessHandle, ProcessRole, source_stdio, transform_stdio};
use super::messages::{ExitNotifier, PairId};
use super::output::spawn_stderr_monitor;
use super::pipe::spawn_pump;
use crate::{Error, Result};

/// One executable invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Everything needed to bring up one pair.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub pair: PairId,
    pub source: CommandSpec,
    pub transform: CommandSpec,
    pub resume_offset: Duration,
}

/// Handles of a freshly spawned pair.
#[derive(Debug)]
pub struct LaunchedPair {
    pub source: ProcessHandle,
    pub transform: ProcessHandle,
}

/// Spawns process pairs on behalf of the supervisor.
pub trait ProcessLauncher: Send + Sync + 'static {
    /// Check that `program` can be executed at all.
    fn ensure_available(&self, program: &str) -> Result<()>;

    /// Spawn both processes, connect them and report their exits through
    /// `notifier`.
    ///
    /// On error nothing is left running.
    fn launch(&self, plan: &LaunchPlan, notifier: ExitNotifier) -> Result<LaunchedPair>;
}

/// Launches real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn ensure_available(&self, program: &str) -> Result<()> {
        match process_utils::resolve_program(program) {
            Some(path) => {
                debug!(program, path = %path.display(), "Resolved executable");
                Ok(())
            }
            None => Err(Error::spawn(
                program,
                std::io::Error::new(std::io::ErrorKind::NotFound, "executable not found"),
            )),
        }
    }

    fn launch(&self, plan: &LaunchPlan, notifier: ExitNotifier) -> Result<LaunchedPair> {
        let pair = plan.pair;

        let mut source_cmd = process_utils::tokio_command(&plan.source.program);
        source_cmd.args(&plan.source.args);
        source_stdio(&mut source_cmd);

        let (mut source, source_streams) = ProcessHandle::spawn(
            ProcessRole::Source,
            &plan.source.program,
            source_cmd,
            notifier.clone(),
        )?;

        let mut transform_cmd = process_utils::tokio_command(&plan.transform.program);
        transform_cmd.args(&plan.transform.args).env("LC_ALL", "C");
        transform_stdio(&mut transform_cmd);

        let (transform, transform_streams) = match ProcessHandle::spawn(
            ProcessRole::Transform,
            &plan.transform.program,
            transform_cmd,
            notifier,
        ) {
            Ok(spawned) => spawned,
            Err(e) => {
                source.terminate();
                return Err(e);
            }
        };

        match (source_streams.stdout, transform_streams.stdin) {
            (Some(stdout), Some(stdin)) => {
                spawn_pump(pair, stdout, stdin);
            }
            _ => warn!(%pair, "Process streams unavailable, pipe not connected"),
        }

        if let Some(stderr) = source_streams.stderr {
            spawn_stderr_monitor(ProcessRole::Source, pair, stderr);
        }
        if let Some(stderr) = transform_streams.stderr {
            spawn_stderr_monitor(ProcessRole::Transform, pair, stderr);
        }

        Ok(LaunchedPair { source, transform })
    }
}
