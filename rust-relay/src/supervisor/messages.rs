//! Message types for the supervisor actor.
//!
//! - `SupervisorMessage`: operator commands, each answered through a oneshot
//! - `SupervisorEvent`: notifications the actor posts to itself (process
//!   exits, timer expiries)

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::handle::{ProcessId, ProcessRole};
use super::session::{Layout, SessionSnapshot};
use super::state::Phase;
use crate::Result;

/// Identity of one spawned {source, transform} pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairId(pub(crate) u64);

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pair-{}", self.0)
    }
}

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    pub message: String,
}

impl CommandAck {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    /// Whether a transform process is currently present.
    pub active: bool,
    pub phase: Phase,
    pub current_config: SessionSnapshot,
}

/// Commands accepted by the supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    Start {
        source_url: String,
        layout: Option<Layout>,
        reply: oneshot::Sender<Result<CommandAck>>,
    },
    ChangeSource {
        source_url: String,
        reply: oneshot::Sender<Result<CommandAck>>,
    },
    UpdateOverlay {
        layout: Option<Layout>,
        overlay_path: Option<PathBuf>,
        reply: oneshot::Sender<Result<CommandAck>>,
    },
    /// Replace the overlay asset used by the next spawn.
    SetOverlayAsset {
        path: PathBuf,
        reply: oneshot::Sender<Result<CommandAck>>,
    },
    Stop {
        reply: oneshot::Sender<Result<CommandAck>>,
    },
    Status {
        reply: oneshot::Sender<SupervisorStatus>,
    },
}

/// Asynchronous notifications delivered back into the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A deferred spawn is due. Dropped unless `epoch` is still current.
    SpawnDue { epoch: u64 },
    SourceExited {
        pair: PairId,
        process: ProcessId,
        code: Option<i32>,
        alive: Duration,
    },
    TransformExited {
        pair: PairId,
        process: ProcessId,
        code: Option<i32>,
    },
    /// The drain grace for a transform ran out.
    WatchdogExpired { pair: PairId, transform: ProcessId },
}

/// Reports process exits for one pair back to the supervisor.
#[derive(Debug, Clone)]
pub struct ExitNotifier {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
    pair: PairId,
}

impl ExitNotifier {
    pub fn new(tx: mpsc::UnboundedSender<SupervisorEvent>, pair: PairId) -> Self {
        Self { tx, pair }
    }

    pub fn pair(&self) -> PairId {
        self.pair
    }

    pub fn exited(&self, role: ProcessRole, process: ProcessId, code: Option<i32>, alive: Duration) {
        let event = match role {
            ProcessRole::Source => SupervisorEvent::SourceExited {
                pair: self.pair,
                process,
                code,
                alive,
            },
            ProcessRole::Transform => SupervisorEvent::TransformExited {
                pair: self.pair,
                process,
                code,
            },
        };
        if self.tx.send(event).is_err() {
            trace!(pair = %self.pair, %process, "Supervisor gone, exit not delivered");
        }
    }
}
