//! Supervisor phase and the live process pair.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::handle::{ProcessHandle, ProcessId};
use super::messages::PairId;
use super::session::Layout;
use super::watchdog::Watchdog;

/// Where the supervisor is in its lifecycle.
///
/// ```text
/// Idle -> Starting -> Running -> Reconfiguring -> Running | Idle
///                     Running -> RecoveringFromCrash -> Running
///                     Running -> Draining -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    /// A fresh spawn is scheduled after `start` or `change_source`.
    Starting,
    Running,
    /// Hot-swap in progress: the old pair is gone, the new one is scheduled.
    Reconfiguring,
    /// Seek-less retry scheduled after a fast crash.
    RecoveringFromCrash,
    /// Source finished cleanly; the transform is flushing under a watchdog.
    Draining,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Reconfiguring => "reconfiguring",
            Self::RecoveringFromCrash => "recovering_from_crash",
            Self::Draining => "draining",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one {source, transform} pair the supervisor may own.
///
/// Both handles always exist together; the supervisor keeps an
/// `Option<ProcessPair>` so a half-populated pair is unrepresentable.
#[derive(Debug)]
pub struct ProcessPair {
    pub id: PairId,
    pub source: ProcessHandle,
    pub transform: ProcessHandle,
    /// Offset the source was asked to resume from.
    pub resume_offset: Duration,
    pub source_url: String,
    pub layout: Layout,
    pub spawned_at: Instant,
    /// Armed once the source completed cleanly.
    pub watchdog: Option<Watchdog>,
}

impl ProcessPair {
    /// Issue kills for whichever members are still running.
    ///
    /// Returns how many kill requests were issued.
    pub fn terminate(&mut self) -> usize {
        self.watchdog = None;
        usize::from(self.source.terminate()) + usize::from(self.transform.terminate())
    }

    pub fn owns_source(&self, id: ProcessId) -> bool {
        self.source.id() == id
    }

    pub fn owns_transform(&self, id: ProcessId) -> bool {
        self.transform.id() == id
    }

    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::handle::ProcessRole;
    use crate::supervisor::session::DEFAULT_LAYOUT;
    use tokio_util::sync::CancellationToken;

    fn pair() -> (ProcessPair, CancellationToken, CancellationToken) {
        let source_kill = CancellationToken::new();
        let transform_kill = CancellationToken::new();
        let pair = ProcessPair {
            id: PairId(1),
            source: ProcessHandle::new(ProcessRole::Source, Some(10), source_kill.clone()),
            transform: ProcessHandle::new(ProcessRole::Transform, Some(11), transform_kill.clone()),
            resume_offset: Duration::ZERO,
            source_url: "https://example.com/v".to_string(),
            layout: DEFAULT_LAYOUT,
            spawned_at: Instant::now(),
            watchdog: None,
        };
        (pair, source_kill, transform_kill)
    }

    #[test]
    fn test_terminate_kills_both() {
        let (mut pair, source_kill, transform_kill) = pair();

        assert_eq!(pair.terminate(), 2);
        assert!(source_kill.is_cancelled());
        assert!(transform_kill.is_cancelled());
        assert_eq!(pair.terminate(), 0);
    }

    #[test]
    fn test_terminate_skips_exited_source() {
        let (mut pair, source_kill, transform_kill) = pair();
        pair.source.mark_exited();

        assert_eq!(pair.terminate(), 1);
        assert!(!source_kill.is_cancelled());
        assert!(transform_kill.is_cancelled());
    }

    #[test]
    fn test_identity_checks() {
        let (pair, _, _) = pair();
        assert!(pair.owns_source(pair.source.id()));
        assert!(!pair.owns_source(pair.transform.id()));
        assert!(pair.owns_transform(pair.transform.id()));
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Phase::RecoveringFromCrash).unwrap(),
            "recovering_from_crash"
        );
        assert_eq!(Phase::Draining.to_string(), "draining");
    }
}
