//! liveview-signaling
//!
//! Client side of the relay server's two HTTP endpoints:
//!
//! ```text
//! Viewer                                   Relay server
//! ─────────────────────────────            ──────────────────────────
//! HttpSignaling  ── POST /offer  ───────►  { sdp, type } → answer
//! HttpHealthProbe ─ GET  /health ───────►  { status, active_peers }
//! ```
//!
//! Both sit behind traits so the connection manager can be driven by fakes.

pub mod health;
pub mod http;

use async_trait::async_trait;
use liveview_core::{SessionDescription, SignalingError};

pub use health::{HealthProbe, HealthReport, HttpHealthProbe};
pub use liveview_core::HealthError;
pub use http::HttpSignaling;

// MARK: - Signaling trait

/// Offer/answer exchange with the signaling endpoint.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Send the local offer and wait for the remote answer.
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, SignalingError>;
}
