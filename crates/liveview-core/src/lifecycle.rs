//! Connection lifecycle state machine.
//!
//! Pure: [`Lifecycle::handle`] takes one [`Input`] and returns the [`Effect`]s
//! the driver must execute, in order. No I/O, no timers, no clocks; the
//! driver in `liveview-player` owns those.
//!
//! ```text
//!            start / reconnect
//!   Idle ──────────────────────► Connecting ──connected──► Connected ──2 tracks──► Streaming
//!                                  ▲     │                     │                      │
//!                   retry fires    │     │ handshake error     │ disconnected/failed  │
//!                   or reconnect   │     ▼                     ▼                      ▼
//!                               Disconnected / Failed ◄──────────────────────────────┘
//!   any ──closed / teardown──► Closed
//! ```
//!
//! Every input that originates from a session (handshake result, transport
//! event, track, retry timer) carries the [`Generation`] it belongs to. Inputs
//! from a superseded generation are dropped.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::policy::ReconnectPolicy;
use crate::types::{ConnectionState, Generation, Notice, TrackKind, TransportState};

/// Tracks needed before the session counts as streaming (one video, one audio).
pub const EXPECTED_TRACKS: u32 = 2;

// MARK: - Input

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// `startConnection()`: replace whatever session exists with a fresh one.
    Start,
    /// User-requested reconnect; resets the attempt budget first.
    Reconnect,
    HandshakeSucceeded { generation: Generation },
    HandshakeFailed { generation: Generation, reason: String },
    Transport { generation: Generation, state: TransportState },
    TrackArrived { generation: Generation, kind: TrackKind, stream_id: String },
    RetryElapsed { generation: Generation },
    /// Stop polling stats without clearing the display (viewer hidden).
    PauseStats,
    ResumeStats,
    Teardown,
}

// MARK: - Effect

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Close and drop the current session, if any.
    CloseSession,
    /// Create a session for `generation` and run the offer/answer exchange.
    OpenSession { generation: Generation },
    AttachSink { stream_id: String },
    DetachSink,
    /// Push current volume/mute to the sink.
    ApplyPlayback,
    RequestPlay,
    ScheduleRetry { generation: Generation, attempt: u32, delay: Duration },
    CancelRetry,
    StartStats,
    /// Stop polling and clear the stats display.
    StopStats,
    /// Stop polling, keep the display.
    PauseStats,
    StateChanged { state: ConnectionState, message: String },
    Tracks { count: u32 },
    ReconnectAvailable(bool),
    Notify(Notice),
}

// MARK: - Lifecycle

#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    generation: Generation,
    policy: ReconnectPolicy,
    track_count: u32,
    sink_attached: bool,
    transport_up: bool,
    stats_running: bool,
    /// Generation whose failure was already routed to the reconnect handler.
    error_handled: Option<Generation>,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            generation: 0,
            policy,
            track_count: 0,
            sink_attached: false,
            transport_up: false,
            stats_running: false,
            error_handled: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn attempts(&self) -> u32 {
        self.policy.attempts()
    }

    pub fn track_count(&self) -> u32 {
        self.track_count
    }

    pub fn stats_running(&self) -> bool {
        self.stats_running
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut fx = Vec::new();
        match input {
            Input::Start => self.start(&mut fx),
            Input::Reconnect => {
                info!("Manual reconnect (attempts reset from {})", self.policy.attempts());
                self.policy.reset();
                self.start(&mut fx);
            }
            Input::HandshakeSucceeded { generation } => {
                if self.is_stale("handshake success", generation) {
                    return fx;
                }
                debug!("Gen[{}] remote description installed", generation);
                self.policy.reset();
            }
            Input::HandshakeFailed { generation, reason } => {
                if self.is_stale("handshake failure", generation) {
                    return fx;
                }
                warn!("Gen[{}] connection error: {}", generation, reason);
                self.transport_up = false;
                self.set_state(&mut fx, ConnectionState::Failed, "Connection error");
                fx.push(Effect::Notify(Notice::error(format!("Connection error: {reason}"))));
                self.handle_error(&mut fx);
            }
            Input::Transport { generation, state } => {
                if self.is_stale("transport event", generation) {
                    return fx;
                }
                self.on_transport(&mut fx, state);
            }
            Input::TrackArrived { generation, kind, stream_id } => {
                if self.is_stale("track", generation) {
                    return fx;
                }
                self.on_track(&mut fx, kind, stream_id);
            }
            Input::RetryElapsed { generation } => {
                if generation != self.generation || self.transport_up {
                    debug!(
                        "Retry for gen {} ignored (current gen {}, connected={})",
                        generation, self.generation, self.transport_up
                    );
                    return fx;
                }
                info!(
                    "Auto-reconnect attempt {}/{}",
                    self.policy.attempts(),
                    self.policy.max_attempts
                );
                self.start(&mut fx);
            }
            Input::PauseStats => {
                if self.stats_running {
                    self.stats_running = false;
                    fx.push(Effect::PauseStats);
                }
            }
            Input::ResumeStats => {
                if self.state == ConnectionState::Streaming && !self.stats_running {
                    self.stats_running = true;
                    fx.push(Effect::StartStats);
                }
            }
            Input::Teardown => {
                info!("Teardown (gen {})", self.generation);
                fx.push(Effect::CancelRetry);
                self.stop_stats(&mut fx);
                fx.push(Effect::CloseSession);
                fx.push(Effect::DetachSink);
                // Invalidate everything still in flight for the old session.
                self.generation += 1;
                self.transport_up = false;
                self.sink_attached = false;
                self.track_count = 0;
                self.set_state(&mut fx, ConnectionState::Closed, "Connection closed");
            }
        }
        fx
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    fn start(&mut self, fx: &mut Vec<Effect>) {
        fx.push(Effect::CancelRetry);
        self.stop_stats(fx);
        fx.push(Effect::CloseSession);
        if self.sink_attached {
            fx.push(Effect::DetachSink);
        }

        self.generation += 1;
        self.track_count = 0;
        self.sink_attached = false;
        self.transport_up = false;
        self.error_handled = None;

        info!("Gen[{}] starting connection (attempts={})", self.generation, self.policy.attempts());
        self.set_state(fx, ConnectionState::Connecting, "Connecting...");
        fx.push(Effect::Tracks { count: 0 });
        fx.push(Effect::OpenSession { generation: self.generation });
    }

    fn on_transport(&mut self, fx: &mut Vec<Effect>, state: TransportState) {
        debug!("Gen[{}] ICE connection state: {:?}", self.generation, state);
        match state {
            TransportState::New | TransportState::Checking => {
                self.transport_up = false;
                self.set_state(fx, ConnectionState::Connecting, "Connecting...");
            }
            TransportState::Connected | TransportState::Completed => {
                self.transport_up = true;
                // Recovered on the same session: the next drop gets its own retry.
                self.error_handled = None;
                // `completed` after `connected` must not demote a live stream.
                if self.state != ConnectionState::Streaming {
                    self.set_state(fx, ConnectionState::Connected, "Waiting for stream...");
                }
                fx.push(Effect::CancelRetry);
                fx.push(Effect::ReconnectAvailable(false));
                if self.track_count >= EXPECTED_TRACKS && self.state != ConnectionState::Streaming {
                    self.enter_streaming(fx);
                }
            }
            TransportState::Disconnected => {
                self.transport_up = false;
                self.set_state(fx, ConnectionState::Disconnected, "Disconnected");
                fx.push(Effect::Notify(Notice::warning(
                    "Connection lost, trying to reconnect...",
                )));
                self.handle_error(fx);
            }
            TransportState::Failed => {
                self.transport_up = false;
                self.set_state(fx, ConnectionState::Failed, "Connection failed");
                fx.push(Effect::Notify(Notice::error("Connection failed")));
                self.handle_error(fx);
            }
            TransportState::Closed => {
                self.transport_up = false;
                self.set_state(fx, ConnectionState::Closed, "Connection closed");
                self.stop_stats(fx);
            }
        }
    }

    fn on_track(&mut self, fx: &mut Vec<Effect>, kind: TrackKind, stream_id: String) {
        info!("Gen[{}] track received: {}", self.generation, kind);
        if !self.sink_attached {
            self.sink_attached = true;
            fx.push(Effect::AttachSink { stream_id });
        }
        self.track_count += 1;
        fx.push(Effect::ApplyPlayback);
        fx.push(Effect::Tracks { count: self.track_count });

        if self.track_count == EXPECTED_TRACKS && self.transport_up {
            self.enter_streaming(fx);
        }
    }

    fn enter_streaming(&mut self, fx: &mut Vec<Effect>) {
        self.set_state(fx, ConnectionState::Streaming, "Stream live");
        fx.push(Effect::Notify(Notice::success("Stream connected")));
        fx.push(Effect::RequestPlay);
        if !self.stats_running {
            self.stats_running = true;
            fx.push(Effect::StartStats);
        }
    }

    /// Reconnection handler: show the manual affordance, halt stats and
    /// schedule at most one backoff retry per generation.
    fn handle_error(&mut self, fx: &mut Vec<Effect>) {
        fx.push(Effect::ReconnectAvailable(true));
        self.stop_stats(fx);

        if self.error_handled == Some(self.generation) {
            debug!("Gen[{}] error already handled; no extra retry", self.generation);
            return;
        }
        self.error_handled = Some(self.generation);

        match self.policy.next_attempt() {
            Some((attempt, delay)) => {
                info!(
                    "Gen[{}] scheduling reconnect {}/{} in {:?}",
                    self.generation, attempt, self.policy.max_attempts, delay
                );
                fx.push(Effect::ScheduleRetry { generation: self.generation, attempt, delay });
            }
            None => {
                warn!("Reconnect budget exhausted after {} attempts", self.policy.attempts());
                fx.push(Effect::Notify(Notice::error("Maximum reconnection attempts exceeded")));
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn stop_stats(&mut self, fx: &mut Vec<Effect>) {
        self.stats_running = false;
        fx.push(Effect::StopStats);
    }

    fn set_state(&mut self, fx: &mut Vec<Effect>, state: ConnectionState, message: &str) {
        if self.state == state {
            return;
        }
        self.state = state;
        fx.push(Effect::StateChanged { state, message: message.to_owned() });
    }

    fn is_stale(&self, what: &str, generation: Generation) -> bool {
        if generation != self.generation {
            debug!("Dropping stale {} (gen {} != {})", what, generation, self.generation);
            return true;
        }
        false
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(fx: &[Effect]) -> Vec<ConnectionState> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn retries(fx: &[Effect]) -> Vec<(u32, u64)> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::ScheduleRetry { attempt, delay, .. } => Some((*attempt, delay.as_millis() as u64)),
                _ => None,
            })
            .collect()
    }

    fn started() -> Lifecycle {
        let mut lc = Lifecycle::default();
        lc.handle(Input::Start);
        lc
    }

    fn transport(lc: &mut Lifecycle, state: TransportState) -> Vec<Effect> {
        let generation = lc.generation();
        lc.handle(Input::Transport { generation, state })
    }

    fn track(lc: &mut Lifecycle, kind: TrackKind) -> Vec<Effect> {
        let generation = lc.generation();
        lc.handle(Input::TrackArrived { generation, kind, stream_id: "stream-0".into() })
    }

    #[test]
    fn start_closes_previous_and_opens_new_generation() {
        let mut lc = Lifecycle::default();
        let fx = lc.handle(Input::Start);
        assert_eq!(lc.state(), ConnectionState::Connecting);
        assert_eq!(lc.generation(), 1);
        let close = fx.iter().position(|e| *e == Effect::CloseSession).unwrap();
        let open = fx.iter().position(|e| *e == Effect::OpenSession { generation: 1 }).unwrap();
        assert!(close < open, "old session must be closed before the new one opens");

        let fx = lc.handle(Input::Start);
        assert!(fx.contains(&Effect::OpenSession { generation: 2 }));
        assert_eq!(fx.iter().filter(|e| **e == Effect::CloseSession).count(), 1);
    }

    #[test]
    fn connected_then_two_tracks_streams_and_starts_stats() {
        let mut lc = started();
        let fx = transport(&mut lc, TransportState::Connected);
        assert_eq!(states(&fx), vec![ConnectionState::Connected]);
        assert!(fx.contains(&Effect::ReconnectAvailable(false)));

        let fx = track(&mut lc, TrackKind::Video);
        assert_eq!(fx[0], Effect::AttachSink { stream_id: "stream-0".into() });
        assert!(states(&fx).is_empty());

        let fx = track(&mut lc, TrackKind::Audio);
        assert!(!fx.iter().any(|e| matches!(e, Effect::AttachSink { .. })), "sink attached once");
        assert_eq!(states(&fx), vec![ConnectionState::Streaming]);
        assert!(fx.contains(&Effect::StartStats));
        assert!(fx.contains(&Effect::RequestPlay));
        assert!(lc.stats_running());
    }

    #[test]
    fn tracks_before_connected_never_skip_connected() {
        let mut lc = started();
        track(&mut lc, TrackKind::Video);
        let fx = track(&mut lc, TrackKind::Audio);
        assert!(states(&fx).is_empty(), "no Streaming before Connected");

        let fx = transport(&mut lc, TransportState::Connected);
        assert_eq!(states(&fx), vec![ConnectionState::Connected, ConnectionState::Streaming]);
    }

    #[test]
    fn single_track_never_streams() {
        let mut lc = started();
        transport(&mut lc, TransportState::Connected);
        track(&mut lc, TrackKind::Audio);
        assert_eq!(lc.state(), ConnectionState::Connected);
        assert_eq!(lc.track_count(), 1);
    }

    #[test]
    fn state_follows_latest_transport_event() {
        let mut lc = started();
        let sequence = [
            (TransportState::Checking, ConnectionState::Connecting),
            (TransportState::Connected, ConnectionState::Connected),
            (TransportState::Disconnected, ConnectionState::Disconnected),
            (TransportState::Connected, ConnectionState::Connected),
            (TransportState::Failed, ConnectionState::Failed),
            (TransportState::Completed, ConnectionState::Connected),
            (TransportState::Closed, ConnectionState::Closed),
            (TransportState::Failed, ConnectionState::Failed),
        ];
        for (event, expected) in sequence {
            transport(&mut lc, event);
            assert_eq!(lc.state(), expected, "after {:?}", event);
        }
    }

    #[test]
    fn completed_does_not_demote_streaming() {
        let mut lc = started();
        transport(&mut lc, TransportState::Connected);
        track(&mut lc, TrackKind::Video);
        track(&mut lc, TrackKind::Audio);
        let fx = transport(&mut lc, TransportState::Completed);
        assert!(states(&fx).is_empty());
        assert_eq!(lc.state(), ConnectionState::Streaming);
    }

    #[test]
    fn failure_schedules_backoff_once_per_generation() {
        let mut lc = started();
        let fx = transport(&mut lc, TransportState::Disconnected);
        assert_eq!(retries(&fx), vec![(1, 1_000)]);
        assert!(fx.contains(&Effect::ReconnectAvailable(true)));
        assert!(fx.contains(&Effect::StopStats));

        let fx = transport(&mut lc, TransportState::Failed);
        assert!(retries(&fx).is_empty(), "second report for the same attempt");
        assert_eq!(lc.attempts(), 1);
        assert_eq!(lc.state(), ConnectionState::Failed);
    }

    #[test]
    fn drop_after_recovery_schedules_another_retry() {
        let mut lc = started();
        let fx = transport(&mut lc, TransportState::Disconnected);
        assert_eq!(retries(&fx), vec![(1, 1_000)]);

        let fx = transport(&mut lc, TransportState::Connected);
        assert!(fx.contains(&Effect::CancelRetry));

        let fx = transport(&mut lc, TransportState::Disconnected);
        assert_eq!(retries(&fx), vec![(2, 2_000)]);

        let fx = transport(&mut lc, TransportState::Failed);
        assert!(retries(&fx).is_empty());
        assert_eq!(lc.state(), ConnectionState::Failed);
        assert_eq!(lc.attempts(), 2);
    }

    #[test]
    fn backoff_sequence_then_give_up() {
        let mut lc = started();
        let mut delays = Vec::new();
        for _ in 0..6 {
            let generation = lc.generation();
            let fx = lc.handle(Input::HandshakeFailed { generation, reason: "refused".into() });
            delays.extend(retries(&fx).into_iter().map(|(_, d)| d));
            if let Some(Effect::ScheduleRetry { generation, .. }) =
                fx.iter().find(|e| matches!(e, Effect::ScheduleRetry { .. }))
            {
                let fx = lc.handle(Input::RetryElapsed { generation: *generation });
                assert!(fx.iter().any(|e| matches!(e, Effect::OpenSession { .. })));
            } else {
                assert!(fx.contains(&Effect::Notify(Notice::error(
                    "Maximum reconnection attempts exceeded"
                ))));
            }
        }
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
        assert_eq!(lc.attempts(), 5);
    }

    #[test]
    fn handshake_success_resets_attempts() {
        let mut lc = started();
        let g = lc.generation();
        lc.handle(Input::HandshakeFailed { generation: g, reason: "503".into() });
        lc.handle(Input::RetryElapsed { generation: g });
        assert_eq!(lc.attempts(), 1);

        let g = lc.generation();
        lc.handle(Input::HandshakeSucceeded { generation: g });
        assert_eq!(lc.attempts(), 0);
    }

    #[test]
    fn manual_reconnect_mid_backoff_makes_retry_stale() {
        let mut lc = started();
        let stale = lc.generation();
        lc.handle(Input::HandshakeFailed { generation: stale, reason: "timeout".into() });
        assert_eq!(lc.attempts(), 1);

        let fx = lc.handle(Input::Reconnect);
        assert_eq!(lc.attempts(), 0);
        assert!(fx.contains(&Effect::CancelRetry));
        assert!(fx.contains(&Effect::OpenSession { generation: stale + 1 }));

        let fx = lc.handle(Input::RetryElapsed { generation: stale });
        assert!(fx.is_empty(), "stale retry must be a no-op");
        assert_eq!(lc.generation(), stale + 1);
    }

    #[test]
    fn retry_is_ignored_once_connected() {
        let mut lc = started();
        let g = lc.generation();
        transport(&mut lc, TransportState::Disconnected);
        transport(&mut lc, TransportState::Connected);
        assert!(lc.handle(Input::RetryElapsed { generation: g }).is_empty());
    }

    #[test]
    fn stale_events_are_dropped() {
        let mut lc = started();
        let old = lc.generation();
        lc.handle(Input::Start);
        assert!(lc.handle(Input::Transport { generation: old, state: TransportState::Failed }).is_empty());
        assert!(lc
            .handle(Input::TrackArrived { generation: old, kind: TrackKind::Video, stream_id: "s".into() })
            .is_empty());
        assert!(lc.handle(Input::HandshakeSucceeded { generation: old }).is_empty());
        assert_eq!(lc.state(), ConnectionState::Connecting);
    }

    #[test]
    fn stale_handshake_failure_is_ignored() {
        let mut lc = started();
        let old = lc.generation();
        lc.handle(Input::Reconnect);

        let fx = lc.handle(Input::HandshakeFailed { generation: old, reason: "late 503".into() });
        assert!(fx.is_empty());
        assert_eq!(lc.state(), ConnectionState::Connecting);
        assert_eq!(lc.attempts(), 0);
    }

    #[test]
    fn closed_stops_stats_without_retry() {
        let mut lc = started();
        let fx = transport(&mut lc, TransportState::Closed);
        assert!(fx.contains(&Effect::StopStats));
        assert!(retries(&fx).is_empty());
    }

    #[test]
    fn pause_and_resume_stats() {
        let mut lc = started();
        assert!(lc.handle(Input::ResumeStats).is_empty(), "not streaming yet");
        transport(&mut lc, TransportState::Connected);
        track(&mut lc, TrackKind::Video);
        track(&mut lc, TrackKind::Audio);

        assert_eq!(lc.handle(Input::PauseStats), vec![Effect::PauseStats]);
        assert!(lc.handle(Input::PauseStats).is_empty());
        assert_eq!(lc.handle(Input::ResumeStats), vec![Effect::StartStats]);
        assert!(lc.handle(Input::ResumeStats).is_empty(), "already polling");
    }

    #[test]
    fn teardown_invalidates_generation() {
        let mut lc = started();
        let g = lc.generation();
        let fx = lc.handle(Input::Teardown);
        assert!(fx.contains(&Effect::CloseSession));
        assert!(fx.contains(&Effect::CancelRetry));
        assert_eq!(lc.state(), ConnectionState::Closed);
        assert!(lc.handle(Input::RetryElapsed { generation: g }).is_empty());
    }
}
