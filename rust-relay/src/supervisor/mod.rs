//! Pipeline supervisor.
//!
//! Owns at most one {source, transform} process pair: a downloader writing
//! media to stdout, piped into ffmpeg which composites an overlay and
//! publishes. The supervisor starts, stops and reconfigures the pair while
//! keeping the logical playback position, classifies source exits and
//! recovers from seek-induced crashes.
//!
//! # Architecture
//!
//! ```text
//! SupervisorHandle --(SupervisorMessage)--> PipelineSupervisor <--(SupervisorEvent)-- waiters / timers
//!                                                  |
//!                                          ProcessLauncher
//!                                                  |
//!                               source stdout --pump--> transform stdin
//! ```

mod actor;
pub mod args;
pub mod classifier;
pub mod handle;
pub mod launcher;
pub mod messages;
pub mod output;
pub mod pipe;
pub mod session;
pub mod state;
mod timer;
pub mod watchdog;

pub use actor::{DEFAULT_MAILBOX_CAPACITY, PipelineSupervisor, SupervisorHandle, spawn};
pub use classifier::{ExitClassifier, ExitVerdict};
pub use handle::{ProcessHandle, ProcessId, ProcessRole};
pub use launcher::{CommandLauncher, CommandSpec, LaunchPlan, LaunchedPair, ProcessLauncher};
pub use messages::{CommandAck, PairId, SupervisorStatus};
pub use session::{DEFAULT_LAYOUT, Layout, SessionConfig, SessionSnapshot};
pub use state::{Phase, ProcessPair};
