//! Deferred delivery of supervisor events.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::trace;

use super::messages::SupervisorEvent;

/// Posts events back into the supervisor's event queue after a delay.
#[derive(Debug, Clone)]
pub struct DeferredEvents {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl DeferredEvents {
    pub fn new(tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self { tx }
    }

    /// Deliver `event` after `delay`.
    ///
    /// Dropping the returned guard cancels delivery. Receivers must still
    /// check that the event is current, since it may already be queued.
    pub fn schedule(&self, delay: Duration, event: SupervisorEvent) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!(?event, "Deferred event cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });

        token.drop_guard()
    }
}
