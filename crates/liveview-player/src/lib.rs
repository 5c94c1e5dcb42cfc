//! liveview-player
//!
//! Runs the connection lifecycle against real collaborators:
//!
//! ```text
//!   ManagerHandle ──Command──►┐
//!   PeerSession   ──PeerEvent─┤   ConnectionManager (one tokio task)
//!   timers/handshake ─Internal┘        │ Lifecycle::handle(Input) -> [Effect]
//!                                      ▼
//!                       PeerFactory / Signaling / MediaSink / Notifier
//! ```
//!
//! Everything the page showed is routed through [`Notifier`]; the element that
//! played the stream is a [`MediaSink`].

pub mod health;
pub mod manager;

use async_trait::async_trait;
use liveview_core::{
    ConnectionState, Notice, PlaybackError, PlaybackSettings, ServerStatus, StatsSnapshot,
};

pub use health::HealthMonitor;
pub use manager::{Collaborators, Command, ConnectionManager, ManagerHandle, ManagerStatus};

// MARK: - MediaSink

/// Whatever renders the received stream.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Bind the sink to the session's stream. Called once per session.
    fn attach(&self, stream_id: &str);

    fn detach(&self);

    /// Push volume and mute.
    fn apply(&self, settings: &PlaybackSettings);

    /// Start playback. May be refused (autoplay policy).
    async fn play(&self) -> Result<(), PlaybackError>;

    fn pause(&self);
}

// MARK: - Notifier

/// UI signals. All methods are fire-and-forget.
pub trait Notifier: Send + Sync {
    fn connection_state(&self, state: ConnectionState, message: &str);

    fn notice(&self, notice: &Notice);

    /// Tracks received on the current session.
    fn tracks(&self, count: u32);

    /// Show or hide the manual reconnect control.
    fn reconnect_available(&self, visible: bool);

    /// Empty snapshot means "clear the panel".
    fn stats(&self, snapshot: &StatsSnapshot);

    fn server_status(&self, status: &ServerStatus);

    fn playback(&self, _settings: &PlaybackSettings) {}
}
