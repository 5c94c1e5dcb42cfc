//! `ConnectionManager`: the tokio driver around [`Lifecycle`].
//!
//! One task owns the lifecycle, the current peer session and the timer
//! handles. Everything that can change state arrives on a channel:
//!
//! - [`Command`]s from the [`ManagerHandle`]
//! - [`PeerEvent`]s from the transport callbacks
//! - handshake results, retry firings and stats samples from tasks the
//!   manager spawned itself
//!
//! Each of those is turned into an [`Input`], fed to [`Lifecycle::handle`],
//! and the returned [`Effect`]s are executed in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use liveview_core::{
    ConnectionState, Effect, Generation, InboundSample, Input, Lifecycle, Notice, PlaybackSettings,
    Quality, ReconnectPolicy, StatsMeter, StatsSnapshot, TransportError, ViewerConfig,
};
use liveview_signaling::{HealthProbe, Signaling};
use liveview_webrtc::{PeerEvent, PeerEventKind, PeerEventRx, PeerEventTx, PeerFactory, PeerSession};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::health::HealthMonitor;
use crate::{MediaSink, Notifier};

const COMMAND_QUEUE: usize = 32;

// MARK: - Commands & status

/// Requests from the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Reconnect,
    TogglePlayPause,
    ToggleMute,
    SetVolume(f32),
    VolumeStep(f32),
    SetAutoQuality(bool),
    ChangeQuality(Quality),
    /// Viewer hidden: stop polling stats, keep the panel.
    PauseStats,
    ResumeStats,
    Shutdown,
}

/// Derived state published after every processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManagerStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub generation: Generation,
    pub tracks: u32,
}

/// Results reported back by tasks the manager spawned.
#[derive(Debug)]
enum Internal {
    Handshake { generation: Generation, result: Result<(), String> },
    RetryElapsed { generation: Generation },
    Stats { generation: Generation, sample: Result<InboundSample, TransportError> },
}

// MARK: - Handle

/// Cloneable front door to a running manager.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ManagerStatus>,
}

impl ManagerHandle {
    /// Queue a command. Returns `false` once the manager has stopped.
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn reconnect(&self) -> bool {
        self.send(Command::Reconnect).await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(Command::Shutdown).await
    }

    pub fn status(&self) -> ManagerStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<ManagerStatus> {
        self.status.clone()
    }
}

// MARK: - ConnectionManager

/// Injected collaborators.
pub struct Collaborators {
    pub factory: Arc<dyn PeerFactory>,
    pub signaling: Arc<dyn Signaling>,
    pub sink: Arc<dyn MediaSink>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct ConnectionManager {
    lifecycle: Lifecycle,
    playback: PlaybackSettings,
    meter: StatsMeter,
    stats_interval: Duration,
    health_interval: Duration,

    factory: Arc<dyn PeerFactory>,
    signaling: Arc<dyn Signaling>,
    sink: Arc<dyn MediaSink>,
    notifier: Arc<dyn Notifier>,
    health_probe: Option<Arc<dyn HealthProbe>>,

    /// At most one open session.
    session: Option<Arc<dyn PeerSession>>,
    /// Generation whose session is current; read by handshake tasks.
    epoch: Arc<AtomicU64>,

    retry_task: Option<JoinHandle<()>>,
    stats_task: Option<JoinHandle<()>>,
    health_task: Option<JoinHandle<()>>,

    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    peer_tx: PeerEventTx,
    peer_rx: PeerEventRx,
    status_tx: watch::Sender<ManagerStatus>,
}

impl ConnectionManager {
    pub fn new(config: &ViewerConfig, deps: Collaborators) -> Self {
        Self::with_policy(
            config.reconnect.clone(),
            config.playback.clone(),
            config.stats_interval(),
            config.health_interval(),
            deps,
        )
    }

    pub fn with_policy(
        policy: ReconnectPolicy,
        playback: PlaybackSettings,
        stats_interval: Duration,
        health_interval: Duration,
        deps: Collaborators,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ManagerStatus::default());
        Self {
            lifecycle: Lifecycle::new(policy),
            playback,
            meter: StatsMeter::new(),
            stats_interval,
            health_interval,
            factory: deps.factory,
            signaling: deps.signaling,
            sink: deps.sink,
            notifier: deps.notifier,
            health_probe: None,
            session: None,
            epoch: Arc::new(AtomicU64::new(0)),
            retry_task: None,
            stats_task: None,
            health_task: None,
            internal_tx,
            internal_rx,
            peer_tx,
            peer_rx,
            status_tx,
        }
    }

    /// Poll `probe` while the manager runs.
    pub fn with_health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.health_probe = Some(probe);
        self
    }

    /// Start the actor. The first connection attempt begins immediately.
    pub fn spawn(self) -> (ManagerHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        let handle = ManagerHandle { commands, status: self.status_tx.subscribe() };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Connection manager started");
        if let Some(probe) = self.health_probe.clone() {
            let monitor = HealthMonitor::new(probe, Arc::clone(&self.notifier), self.health_interval);
            self.health_task = Some(tokio::spawn(monitor.run(self.status_tx.subscribe())));
        }

        self.dispatch(Input::Start).await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(event) = self.peer_rx.recv() => self.on_peer_event(event).await,
                Some(internal) = self.internal_rx.recv() => self.on_internal(internal).await,
            }
        }

        self.dispatch(Input::Teardown).await;
        if let Some(task) = self.health_task.take() {
            task.abort();
        }
        info!("Connection manager stopped");
    }

    // ── Event sources ────────────────────────────────────────────────────────

    async fn on_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::Reconnect => self.dispatch(Input::Reconnect).await,
            Command::PauseStats => self.dispatch(Input::PauseStats).await,
            Command::ResumeStats => self.dispatch(Input::ResumeStats).await,
            Command::TogglePlayPause => self.toggle_play_pause().await,
            Command::ToggleMute => {
                self.playback.toggle_mute();
                self.playback_changed();
            }
            Command::SetVolume(volume) => {
                self.playback.set_volume(volume);
                self.playback_changed();
            }
            Command::VolumeStep(delta) => {
                self.playback.step_volume(delta);
                self.playback_changed();
            }
            Command::SetAutoQuality(enabled) => {
                self.playback.set_auto_quality(enabled);
                self.notifier.playback(&self.playback);
            }
            Command::ChangeQuality(quality) => {
                if self.playback.change_quality(quality) {
                    info!("Quality preference set to {}", quality);
                    self.notifier.notice(&Notice::info(format!(
                        "Quality changed to {quality} (server-side support pending)"
                    )));
                    self.notifier.playback(&self.playback);
                } else {
                    debug!("Quality change to {} ignored: auto quality is on", quality);
                }
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent { generation, kind } = event;
        let input = match kind {
            PeerEventKind::Transport(state) => Input::Transport { generation, state },
            PeerEventKind::Track { kind, stream_id } => {
                Input::TrackArrived { generation, kind, stream_id }
            }
        };
        self.dispatch(input).await;
    }

    async fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Handshake { generation, result: Ok(()) } => {
                self.dispatch(Input::HandshakeSucceeded { generation }).await
            }
            Internal::Handshake { generation, result: Err(reason) } => {
                self.dispatch(Input::HandshakeFailed { generation, reason }).await
            }
            Internal::RetryElapsed { generation } => {
                // A late firing must not drop the handle of a newer retry.
                if generation == self.lifecycle.generation() {
                    self.retry_task = None;
                }
                self.dispatch(Input::RetryElapsed { generation }).await
            }
            Internal::Stats { generation, sample } => self.on_stats(generation, sample),
        }
    }

    fn on_stats(&mut self, generation: Generation, sample: Result<InboundSample, TransportError>) {
        if generation != self.lifecycle.generation() || !self.lifecycle.stats_running() {
            return;
        }
        match sample {
            Ok(sample) => {
                let snapshot = self.meter.sample(&sample);
                self.notifier.stats(&snapshot);
            }
            Err(e) => warn!("Gen[{}] stats poll failed: {}", generation, e),
        }
    }

    // ── Lifecycle plumbing ───────────────────────────────────────────────────

    /// Feed `input` and run effects until nothing more is produced.
    async fn dispatch(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            for effect in self.lifecycle.handle(input) {
                if let Some(next) = self.execute(effect).await {
                    pending.push_back(next);
                }
            }
        }
        self.publish_status();
    }

    async fn execute(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::CloseSession => self.close_session().await,
            Effect::OpenSession { generation } => return self.open_session(generation).await,
            Effect::AttachSink { stream_id } => {
                info!("Attaching sink to stream {}", stream_id);
                self.sink.attach(&stream_id);
            }
            Effect::DetachSink => self.sink.detach(),
            Effect::ApplyPlayback => self.sink.apply(&self.playback),
            Effect::RequestPlay => self.autoplay().await,
            Effect::ScheduleRetry { generation, attempt, delay } => {
                self.schedule_retry(generation, attempt, delay)
            }
            Effect::CancelRetry => {
                if let Some(task) = self.retry_task.take() {
                    task.abort();
                }
            }
            Effect::StartStats => self.start_stats(),
            Effect::StopStats => {
                self.abort_stats();
                self.meter.reset();
                self.notifier.stats(&StatsSnapshot::default());
            }
            Effect::PauseStats => self.abort_stats(),
            Effect::StateChanged { state, message } => {
                info!("State: {} ({})", state, message);
                self.notifier.connection_state(state, &message);
            }
            Effect::Tracks { count } => self.notifier.tracks(count),
            Effect::ReconnectAvailable(visible) => self.notifier.reconnect_available(visible),
            Effect::Notify(notice) => self.notifier.notice(&notice),
        }
        None
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(ManagerStatus {
            state: self.lifecycle.state(),
            attempts: self.lifecycle.attempts(),
            generation: self.lifecycle.generation(),
            tracks: self.lifecycle.track_count(),
        });
    }

    // ── Effects ──────────────────────────────────────────────────────────────

    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Closing previous session failed: {}", e);
            }
        }
    }

    async fn open_session(&mut self, generation: Generation) -> Option<Input> {
        self.epoch.store(generation, Ordering::Release);

        let session = match self.factory.create(generation, self.peer_tx.clone()).await {
            Ok(session) => session,
            Err(e) => {
                error!("Gen[{}] could not create peer connection: {}", generation, e);
                return Some(Input::HandshakeFailed { generation, reason: e.to_string() });
            }
        };
        self.session = Some(Arc::clone(&session));

        let signaling = Arc::clone(&self.signaling);
        let epoch = Arc::clone(&self.epoch);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = handshake(session.as_ref(), signaling.as_ref(), generation, &epoch).await;
            let _ = tx.send(Internal::Handshake { generation, result });
        });
        None
    }

    fn schedule_retry(&mut self, generation: Generation, attempt: u32, delay: Duration) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
        debug!("Gen[{}] retry {} armed for {:?}", generation, attempt, delay);
        let tx = self.internal_tx.clone();
        self.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::RetryElapsed { generation });
        }));
    }

    fn start_stats(&mut self) {
        self.abort_stats();
        let Some(session) = self.session.clone() else {
            debug!("No session; stats not started");
            return;
        };
        let generation = self.lifecycle.generation();
        let interval = self.stats_interval;
        let tx = self.internal_tx.clone();
        self.stats_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let sample = session.inbound_stats().await;
                if tx.send(Internal::Stats { generation, sample }).is_err() {
                    break;
                }
            }
        }));
    }

    fn abort_stats(&mut self) {
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
    }

    /// Playback requested by the lifecycle once the stream is live.
    async fn autoplay(&mut self) {
        match self.sink.play().await {
            Ok(()) => {
                self.playback.paused = false;
                self.notifier.playback(&self.playback);
            }
            Err(e) => {
                info!("Autoplay refused: {}", e);
                self.notifier.notice(&Notice::info("Press play to start the stream"));
            }
        }
    }

    async fn toggle_play_pause(&mut self) {
        if self.playback.paused {
            match self.sink.play().await {
                Ok(()) => self.playback.paused = false,
                Err(e) => {
                    warn!("Playback could not start: {}", e);
                    self.notifier.notice(&Notice::error(format!("Playback could not start: {e}")));
                    return;
                }
            }
        } else {
            self.sink.pause();
            self.playback.paused = true;
        }
        self.notifier.playback(&self.playback);
    }

    fn playback_changed(&self) {
        self.sink.apply(&self.playback);
        self.notifier.playback(&self.playback);
    }
}

/// Offer, signaling round trip, remote description.
///
/// The answer is only installed while `generation` is still current; a
/// superseded attempt reports its result anyway and the lifecycle drops it.
async fn handshake(
    session: &dyn PeerSession,
    signaling: &dyn Signaling,
    generation: Generation,
    epoch: &AtomicU64,
) -> Result<(), String> {
    let offer = session.create_offer().await.map_err(|e| e.to_string())?;
    debug!("Gen[{}] offer ready ({} bytes of SDP)", generation, offer.sdp.len());

    let answer = signaling.exchange(&offer).await.map_err(|e| e.to_string())?;

    let current = epoch.load(Ordering::Acquire);
    if current != generation {
        debug!("Gen[{}] superseded by gen {}; answer discarded", generation, current);
        return Err("superseded".into());
    }
    session.set_remote_description(answer).await.map_err(|e| e.to_string())
}
