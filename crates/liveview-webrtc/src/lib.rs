//! liveview-webrtc: receive-only peer transport.
//!
//! The connection manager never talks to webrtc-rs directly. It sees a
//! [`PeerFactory`] that opens one [`PeerSession`] per connection attempt and a
//! stream of [`PeerEvent`]s tagged with that attempt's generation.
//!
//! ```text
//! ConnectionManager ── create(gen) ──► RtcPeerFactory ──► RTCPeerConnection
//!        ▲                                                   │ on_ice_connection_state_change
//!        └──────────── PeerEvent { gen, .. } ◄───────────────┘ on_track
//! ```

pub mod counters;
pub mod peer;

use std::sync::Arc;

use async_trait::async_trait;
use liveview_core::{
    Generation, InboundSample, SessionDescription, TrackKind, TransportError, TransportState,
};
use tokio::sync::mpsc;

pub use counters::InboundCounters;
pub use peer::{RtcPeerFactory, RtcPeerSession};

// MARK: - Events

/// Something the transport reported for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEvent {
    pub generation: Generation,
    pub kind: PeerEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEventKind {
    Transport(TransportState),
    Track { kind: TrackKind, stream_id: String },
}

pub type PeerEventTx = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventRx = mpsc::UnboundedReceiver<PeerEvent>;

// MARK: - Traits

/// Opens peer sessions configured to receive one video and one audio track.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Create a session for `generation`. Transport and track callbacks are
    /// delivered on `events`, tagged with `generation`.
    async fn create(
        &self,
        generation: Generation,
        events: PeerEventTx,
    ) -> Result<Arc<dyn PeerSession>, TransportError>;
}

/// One live peer connection.
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Create the local offer, install it, and return it once ICE gathering
    /// has finished (or timed out).
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_remote_description(&self, answer: SessionDescription) -> Result<(), TransportError>;

    /// Inbound counters for the stats panel.
    async fn inbound_stats(&self) -> Result<InboundSample, TransportError>;

    /// Close the connection and release its resources. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}
