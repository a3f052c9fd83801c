//! The pipeline supervisor actor.
//!
//! A single task owns the session configuration and the process pair.
//! Operator commands arrive through [`SupervisorHandle`]; process exits and
//! timer expiries are posted back as [`SupervisorEvent`]s. Everything is
//! handled one message at a time, so no locks guard the state.
//!
//! Every deferred event is checked against current state before acting:
//! spawns carry an epoch, exits and watchdog expiries carry the pair and
//! process identities they were created for.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, trace, warn};

use super::args::{build_source_args, build_transform_args};
use super::classifier::{ExitClassifier, ExitVerdict};
use super::handle::ProcessId;
use super::launcher::{CommandSpec, LaunchPlan, LaunchedPair, ProcessLauncher};
use super::messages::{
    CommandAck, ExitNotifier, PairId, SupervisorEvent, SupervisorMessage, SupervisorStatus,
};
use super::session::{DEFAULT_LAYOUT, Layout, SessionConfig};
use super::state::{Phase, ProcessPair};
use super::timer::DeferredEvents;
use super::watchdog::Watchdog;
use crate::config::SupervisorSettings;
use crate::{Error, Result};

/// Default mailbox capacity for the supervisor.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// A spawn waiting for its settle delay.
#[derive(Debug)]
struct PendingSpawn {
    epoch: u64,
    resume_offset: Duration,
    /// Source and layout pinned by a retry. Otherwise read from the session
    /// when the spawn fires.
    target: Option<(String, Layout)>,
    _timer: DropGuard,
}

/// Cloneable handle for sending commands to the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<SupervisorMessage>,
}

impl SupervisorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SupervisorMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::SupervisorUnavailable)?;
        rx.await.map_err(|_| Error::SupervisorUnavailable)
    }

    /// Start a new session, replacing any running one.
    pub async fn start(
        &self,
        source_url: impl Into<String>,
        layout: Option<Layout>,
    ) -> Result<CommandAck> {
        let source_url = source_url.into();
        self.request(|reply| SupervisorMessage::Start {
            source_url,
            layout,
            reply,
        })
        .await?
    }

    /// Switch to another source. Playback restarts from the beginning.
    pub async fn change_source(&self, source_url: impl Into<String>) -> Result<CommandAck> {
        let source_url = source_url.into();
        self.request(|reply| SupervisorMessage::ChangeSource { source_url, reply })
            .await?
    }

    /// Hot-swap layout and/or overlay, resuming at the current position.
    pub async fn update_overlay(
        &self,
        layout: Option<Layout>,
        overlay_path: Option<PathBuf>,
    ) -> Result<CommandAck> {
        self.request(|reply| SupervisorMessage::UpdateOverlay {
            layout,
            overlay_path,
            reply,
        })
        .await?
    }

    /// Replace the overlay asset picked up by the next spawn.
    pub async fn set_overlay_asset(&self, path: impl Into<PathBuf>) -> Result<CommandAck> {
        let path = path.into();
        self.request(|reply| SupervisorMessage::SetOverlayAsset { path, reply })
            .await?
    }

    pub async fn stop(&self) -> Result<CommandAck> {
        self.request(|reply| SupervisorMessage::Stop { reply }).await?
    }

    pub async fn status(&self) -> Result<SupervisorStatus> {
        self.request(|reply| SupervisorMessage::Status { reply }).await
    }
}

/// Spawn the supervisor task.
///
/// The task runs until `cancel` fires or every handle is dropped, and kills
/// any live pair on the way out.
pub fn spawn<L: ProcessLauncher>(
    settings: SupervisorSettings,
    launcher: L,
    cancel: CancellationToken,
) -> (SupervisorHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
    let supervisor = PipelineSupervisor::new(settings, launcher, mailbox, cancel);
    let task = tokio::spawn(supervisor.run());
    (SupervisorHandle { sender }, task)
}

pub struct PipelineSupervisor<L> {
    settings: SupervisorSettings,
    launcher: L,
    classifier: ExitClassifier,
    session: SessionConfig,
    pair: Option<ProcessPair>,
    phase: Phase,
    /// Bumped whenever scheduled spawns must be invalidated.
    epoch: u64,
    pending: Option<PendingSpawn>,
    next_pair: u64,
    /// Fast-crash retries used in the current logical session.
    seek_retries: u32,
    timers: DeferredEvents,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    mailbox: mpsc::Receiver<SupervisorMessage>,
    cancel: CancellationToken,
}

impl<L: ProcessLauncher> PipelineSupervisor<L> {
    pub fn new(
        settings: SupervisorSettings,
        launcher: L,
        mailbox: mpsc::Receiver<SupervisorMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            classifier: ExitClassifier::new(settings.timings.fast_crash_window),
            session: SessionConfig::new(settings.default_overlay.clone()),
            settings,
            launcher,
            pair: None,
            phase: Phase::Idle,
            epoch: 0,
            pending: None,
            next_pair: 1,
            seek_retries: 0,
            timers: DeferredEvents::new(events_tx.clone()),
            events_tx,
            events,
            mailbox,
            cancel,
        }
    }

    /// Run the event loop.
    pub async fn run(mut self) {
        info!(
            source = %self.settings.source_binary,
            transform = %self.settings.transform_binary,
            "Pipeline supervisor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Pipeline supervisor cancelled");
                    break;
                }

                // Internal events first: they describe what already happened
                Some(event) = self.events.recv() => {
                    self.handle_event(event);
                }

                msg = self.mailbox.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => {
                        debug!("All supervisor handles dropped");
                        break;
                    }
                },
            }
        }

        let killed = self.teardown();
        self.set_phase(Phase::Idle);
        info!(killed, "Pipeline supervisor stopped");
    }

    fn handle_message(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::Start {
                source_url,
                layout,
                reply,
            } => {
                let _ = reply.send(self.handle_start(source_url, layout));
            }
            SupervisorMessage::ChangeSource { source_url, reply } => {
                let _ = reply.send(self.handle_change_source(source_url));
            }
            SupervisorMessage::UpdateOverlay {
                layout,
                overlay_path,
                reply,
            } => {
                let _ = reply.send(self.handle_update_overlay(layout, overlay_path));
            }
            SupervisorMessage::SetOverlayAsset { path, reply } => {
                info!(path = %path.display(), "Overlay asset replaced");
                self.session.set_overlay_path(path);
                let _ = reply.send(Ok(CommandAck::new("Overlay updated!")));
            }
            SupervisorMessage::Stop { reply } => {
                let _ = reply.send(Ok(self.handle_stop()));
            }
            SupervisorMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn handle_start(&mut self, source_url: String, layout: Option<Layout>) -> Result<CommandAck> {
        let source_url = validate_url(source_url)?;
        let layout = layout.unwrap_or(DEFAULT_LAYOUT);
        layout.validate()?;
        self.preflight()?;

        let killed = self.teardown();
        self.seek_retries = 0;
        self.session.begin(source_url.clone(), layout, Instant::now());
        info!(url = %source_url, %layout, killed, "Starting stream");

        self.schedule_spawn(
            self.settings.timings.start_settle,
            Duration::ZERO,
            None,
            Phase::Starting,
        );
        Ok(CommandAck::new("Starting stream"))
    }

    fn handle_change_source(&mut self, source_url: String) -> Result<CommandAck> {
        let source_url = validate_url(source_url)?;
        let layout = self.session.layout().unwrap_or(DEFAULT_LAYOUT);
        self.preflight()?;

        let killed = self.teardown();
        self.seek_retries = 0;
        // New source, new clock: the old position means nothing here.
        self.session.begin(source_url.clone(), layout, Instant::now());
        info!(url = %source_url, killed, "Changing source");

        self.schedule_spawn(
            self.settings.timings.start_settle,
            Duration::ZERO,
            None,
            Phase::Starting,
        );
        Ok(CommandAck::new("Stream source changed"))
    }

    fn handle_update_overlay(
        &mut self,
        layout: Option<Layout>,
        overlay_path: Option<PathBuf>,
    ) -> Result<CommandAck> {
        if self.pair.is_none() {
            return Err(Error::NoActiveSession);
        }
        if let Some(layout) = &layout {
            layout.validate()?;
        }
        self.preflight()?;

        self.session.merge_overlay(layout, overlay_path);
        self.session.resume_target()?;
        let resume_offset = self.session.resume_offset(Instant::now());

        let killed = self.teardown();
        info!(
            layout = ?self.session.layout(),
            overlay = %self.session.overlay_path().display(),
            offset_secs = resume_offset.as_secs(),
            killed,
            "Hot-swapping overlay"
        );

        self.schedule_spawn(
            self.settings.timings.hot_swap_settle,
            resume_offset,
            None,
            Phase::Reconfiguring,
        );
        Ok(CommandAck::new("Overlay and layout updated (resuming)"))
    }

    fn handle_stop(&mut self) -> CommandAck {
        let killed = self.teardown();
        self.session.clear();
        self.seek_retries = 0;
        if killed > 0 {
            info!(killed, "Stream stopped");
        } else {
            debug!("Stop requested while idle");
        }
        self.set_phase(Phase::Idle);
        CommandAck::new("Stream stopped")
    }

    fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            active: self.pair.is_some(),
            phase: self.phase,
            current_config: self.session.snapshot(Instant::now()),
        }
    }

    fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::SpawnDue { epoch } => self.handle_spawn_due(epoch),
            SupervisorEvent::SourceExited {
                pair,
                process,
                code,
                alive,
            } => self.handle_source_exit(pair, process, code, alive),
            SupervisorEvent::TransformExited {
                pair,
                process,
                code,
            } => self.handle_transform_exit(pair, process, code),
            SupervisorEvent::WatchdogExpired { pair, transform } => {
                self.handle_watchdog(pair, transform)
            }
        }
    }

    fn handle_spawn_due(&mut self, epoch: u64) {
        let Some(pending) = self.pending.take_if(|p| p.epoch == epoch) else {
            trace!(epoch, current = self.epoch, "Dropping superseded spawn");
            return;
        };

        if let Err(e) = self.spawn_pair(pending.resume_offset, pending.target) {
            error!(error = %e, "Failed to spawn pipeline");
            self.set_phase(Phase::Idle);
        }
    }

    fn spawn_pair(
        &mut self,
        resume_offset: Duration,
        target: Option<(String, Layout)>,
    ) -> Result<()> {
        let (source_url, layout) = match target {
            Some(target) => target,
            None => self.session.resume_target()?,
        };

        let id = PairId(self.next_pair);
        self.next_pair += 1;

        let plan = LaunchPlan {
            pair: id,
            source: CommandSpec::new(
                &self.settings.source_binary,
                build_source_args(
                    &source_url,
                    resume_offset,
                    self.settings.timings.min_seek,
                    self.settings.proxy.as_deref(),
                ),
            ),
            transform: CommandSpec::new(
                &self.settings.transform_binary,
                build_transform_args(self.session.overlay_path(), &layout, &self.settings.publish),
            ),
            resume_offset,
        };

        let LaunchedPair { source, transform } = self
            .launcher
            .launch(&plan, ExitNotifier::new(self.events_tx.clone(), id))?;

        info!(
            pair = %id,
            source_pid = ?source.pid(),
            transform_pid = ?transform.pid(),
            offset_secs = resume_offset.as_secs(),
            "Pipeline spawned"
        );

        self.pair = Some(ProcessPair {
            id,
            source,
            transform,
            resume_offset,
            source_url,
            layout,
            spawned_at: Instant::now(),
            watchdog: None,
        });
        self.set_phase(Phase::Running);
        Ok(())
    }

    fn handle_source_exit(
        &mut self,
        pair: PairId,
        process: ProcessId,
        code: Option<i32>,
        alive: Duration,
    ) {
        let Some(current) = self
            .pair
            .as_mut()
            .filter(|p| p.id == pair && p.owns_source(process))
        else {
            trace!(%pair, %process, ?code, "Ignoring exit of superseded source");
            return;
        };
        current.source.mark_exited();

        let mut verdict = self
            .classifier
            .classify(code, alive, current.resume_offset);
        if verdict == ExitVerdict::FastCrashOnSeek
            && self.seek_retries >= self.settings.max_seek_retries
        {
            warn!(
                %pair,
                retries = self.seek_retries,
                "Seek retry budget exhausted"
            );
            verdict = ExitVerdict::HardFailure;
        }

        info!(
            %pair,
            ?code,
            alive_ms = alive.as_millis() as u64,
            offset_secs = current.resume_offset.as_secs(),
            %verdict,
            "Source exited"
        );

        match verdict {
            ExitVerdict::CleanCompletion => {
                let grace = self.settings.timings.drain_grace;
                current.watchdog = Some(Watchdog::arm(
                    &self.timers,
                    pair,
                    current.transform.id(),
                    grace,
                ));
                debug!(%pair, grace_secs = grace.as_secs(), "Watchdog armed");
                self.set_phase(Phase::Draining);
            }
            ExitVerdict::FastCrashOnSeek => {
                self.seek_retries += 1;
                let target = (current.source_url.clone(), current.layout);
                self.teardown();
                warn!(
                    %pair,
                    url = %target.0,
                    attempt = self.seek_retries,
                    "Source failed right after seeking, retrying from the live position"
                );
                self.schedule_spawn(
                    self.settings.timings.retry_delay,
                    Duration::ZERO,
                    Some(target),
                    Phase::RecoveringFromCrash,
                );
            }
            ExitVerdict::HardFailure => {
                self.teardown();
                error!(%pair, ?code, "Source failed, stream ended");
                self.set_phase(Phase::Idle);
            }
        }
    }

    fn handle_transform_exit(&mut self, pair: PairId, process: ProcessId, code: Option<i32>) {
        let Some(mut current) = self
            .pair
            .take_if(|p| p.id == pair && p.owns_transform(process))
        else {
            trace!(%pair, %process, ?code, "Ignoring exit of superseded transform");
            return;
        };

        current.transform.mark_exited();
        let killed = current.terminate();
        info!(
            %pair,
            ?code,
            uptime_secs = current.uptime().as_secs(),
            killed,
            "Transform exited, pipeline closed"
        );
        self.set_phase(Phase::Idle);
    }

    fn handle_watchdog(&mut self, pair: PairId, transform: ProcessId) {
        let expired = self.pair.take_if(|p| {
            p.watchdog
                .as_ref()
                .is_some_and(|w| w.matches(pair, transform))
        });
        let Some(mut current) = expired else {
            trace!(%pair, %transform, "Ignoring stale watchdog");
            return;
        };

        warn!(
            %pair,
            grace_secs = self.settings.timings.drain_grace.as_secs(),
            "Transform still running after source completed, terminating"
        );
        current.terminate();
        self.set_phase(Phase::Idle);
    }

    /// Both binaries must be executable before a command is accepted.
    fn preflight(&self) -> Result<()> {
        self.launcher
            .ensure_available(&self.settings.source_binary)?;
        self.launcher
            .ensure_available(&self.settings.transform_binary)
    }

    /// Drop any scheduled spawn and kill the current pair.
    ///
    /// Kill requests are issued before this returns. Returns how many were
    /// issued.
    fn teardown(&mut self) -> usize {
        self.epoch += 1;
        self.pending = None;
        self.pair.take().map_or(0, |mut pair| pair.terminate())
    }

    fn schedule_spawn(
        &mut self,
        delay: Duration,
        resume_offset: Duration,
        target: Option<(String, Layout)>,
        phase: Phase,
    ) {
        self.epoch += 1;
        let epoch = self.epoch;
        let timer = self
            .timers
            .schedule(delay, SupervisorEvent::SpawnDue { epoch });
        self.pending = Some(PendingSpawn {
            epoch,
            resume_offset,
            target,
            _timer: timer,
        });
        debug!(
            epoch,
            delay_ms = delay.as_millis() as u64,
            offset_secs = resume_offset.as_secs(),
            "Spawn scheduled"
        );
        self.set_phase(phase);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Phase transition");
            self.phase = phase;
        }
    }
}

fn validate_url(url: String) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::validation("URL required"));
    }
    Ok(url.to_string())
}
