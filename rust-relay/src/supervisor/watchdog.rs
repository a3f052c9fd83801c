//! Drain watchdog for a transform whose source finished cleanly.
//!
//! Armed once per pair. On expiry the supervisor receives the pair and
//! transform identities and acts only if that exact transform is still the
//! live one; a watchdog from a superseded pair is a no-op.

use std::time::Duration;

use tokio_util::sync::DropGuard;

use super::handle::ProcessId;
use super::messages::{PairId, SupervisorEvent};
use super::timer::DeferredEvents;

#[derive(Debug)]
pub struct Watchdog {
    pair: PairId,
    transform: ProcessId,
    _timer: DropGuard,
}

impl Watchdog {
    /// Start the grace period for `transform`.
    pub fn arm(timers: &DeferredEvents, pair: PairId, transform: ProcessId, grace: Duration) -> Self {
        let timer = timers.schedule(grace, SupervisorEvent::WatchdogExpired { pair, transform });
        Self {
            pair,
            transform,
            _timer: timer,
        }
    }

    /// Whether an expiry event belongs to this watchdog.
    pub fn matches(&self, pair: PairId, transform: ProcessId) -> bool {
        self.pair == pair && self.transform == transform
    }
}
