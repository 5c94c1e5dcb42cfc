//! webrtc-rs implementation of [`PeerFactory`] / [`PeerSession`].
//!
//! Flow per session:
//! 1. `RTCPeerConnection` with the configured STUN servers
//! 2. recv-only transceivers for video and audio
//! 3. offer → set local → wait for ICE gathering (bounded)
//! 4. remote answer installed by the manager after the signaling round trip
//! 5. `on_track` spawns a reader per track that feeds [`InboundCounters`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use liveview_core::{
    Generation, InboundSample, SessionDescription, TrackKind, TransportError, TransportState,
};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use crate::counters::InboundCounters;
use crate::{PeerEvent, PeerEventKind, PeerEventTx, PeerFactory, PeerSession};

const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

// ── Factory ──────────────────────────────────────────────────────────────────

/// Builds receive-only peer connections.
#[derive(Debug, Clone)]
pub struct RtcPeerFactory {
    ice_servers: Vec<String>,
    gather_timeout: Duration,
}

impl RtcPeerFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers, gather_timeout: DEFAULT_GATHER_TIMEOUT }
    }

    pub fn with_gather_timeout(mut self, timeout: Duration) -> Self {
        self.gather_timeout = timeout;
        self
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|url| RTCIceServer { urls: vec![url.clone()], ..Default::default() })
                .collect(),
            ..Default::default()
        }
    }
}

fn build_api() -> Result<API, TransportError> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| TransportError::CreateFailed { reason: format!("codecs: {e}") })?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| TransportError::CreateFailed { reason: format!("interceptors: {e}") })?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create(
        &self,
        generation: Generation,
        events: PeerEventTx,
    ) -> Result<Arc<dyn PeerSession>, TransportError> {
        let api = build_api()?;
        let pc = api
            .new_peer_connection(self.rtc_config())
            .await
            .map_err(|e| TransportError::CreateFailed { reason: e.to_string() })?;
        let pc = Arc::new(pc);

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| TransportError::CreateFailed {
                reason: format!("{kind} transceiver: {e}"),
            })?;
        }

        let counters = Arc::new(InboundCounters::new());

        let state_tx = events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            debug!("Gen[{}] ICE connection state: {}", generation, state);
            if let Some(state) = map_ice_state(state) {
                let _ = state_tx.send(PeerEvent { generation, kind: PeerEventKind::Transport(state) });
            }
            Box::pin(async {})
        }));

        let track_tx = events;
        let track_counters = Arc::clone(&counters);
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Audio => TrackKind::Audio,
                    other => {
                        warn!("Gen[{}] ignoring track of kind {}", generation, other);
                        return Box::pin(async {});
                    }
                };
                info!(
                    "Gen[{}] track received: {} ({})",
                    generation,
                    kind,
                    track.codec().capability.mime_type
                );
                let _ = track_tx.send(PeerEvent {
                    generation,
                    kind: PeerEventKind::Track { kind, stream_id: track.stream_id() },
                });

                let counters = Arc::clone(&track_counters);
                Box::pin(async move {
                    tokio::spawn(read_track(track, kind, counters, generation));
                })
            },
        ));

        info!("Gen[{}] peer connection created ({} ICE servers)", generation, self.ice_servers.len());
        Ok(Arc::new(RtcPeerSession {
            pc,
            counters,
            generation,
            gather_timeout: self.gather_timeout,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Maps webrtc-rs ICE states; `Unspecified` has no counterpart.
pub fn map_ice_state(state: RTCIceConnectionState) -> Option<TransportState> {
    match state {
        RTCIceConnectionState::New          => Some(TransportState::New),
        RTCIceConnectionState::Checking     => Some(TransportState::Checking),
        RTCIceConnectionState::Connected    => Some(TransportState::Connected),
        RTCIceConnectionState::Completed    => Some(TransportState::Completed),
        RTCIceConnectionState::Disconnected => Some(TransportState::Disconnected),
        RTCIceConnectionState::Failed       => Some(TransportState::Failed),
        RTCIceConnectionState::Closed       => Some(TransportState::Closed),
        _                                   => None,
    }
}

/// Drain RTP from one remote track until the connection goes away.
async fn read_track(
    track: Arc<TrackRemote>,
    kind: TrackKind,
    counters: Arc<InboundCounters>,
    generation: Generation,
) {
    let mut packets: u64 = 0;
    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => {
                packets += 1;
                match kind {
                    TrackKind::Video => counters.record_video(
                        packet.payload.len(),
                        packet.header.marker,
                        Instant::now(),
                    ),
                    TrackKind::Audio => counters.record_audio(packet.payload.len()),
                }
                if packets == 1 {
                    debug!("Gen[{}] first {} packet ({} bytes)", generation, kind, packet.payload.len());
                }
            }
            Err(e) => {
                debug!("Gen[{}] {} reader stopped after {} packets: {}", generation, kind, packets, e);
                return;
            }
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct RtcPeerSession {
    pc: Arc<RTCPeerConnection>,
    counters: Arc<InboundCounters>,
    generation: Generation,
    gather_timeout: Duration,
    closed: AtomicBool,
}

#[async_trait]
impl PeerSession for RtcPeerSession {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::OfferFailed { reason: e.to_string() })?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| TransportError::DescriptionFailed { side: "local", reason: e.to_string() })?;

        if tokio::time::timeout(self.gather_timeout, gather_complete.recv()).await.is_err() {
            warn!(
                "Gen[{}] ICE gathering not complete after {:?}; sending partial candidates",
                self.generation, self.gather_timeout
            );
        }

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| TransportError::OfferFailed { reason: "no local description".into() })?;

        Ok(SessionDescription { sdp: local.sdp, kind: local.sdp_type.to_string() })
    }

    async fn set_remote_description(&self, answer: SessionDescription) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if !answer.is_answer() {
            return Err(TransportError::DescriptionFailed {
                side: "remote",
                reason: format!("unsupported type '{}'", answer.kind),
            });
        }
        let desc = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| TransportError::DescriptionFailed { side: "remote", reason: e.to_string() })?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| TransportError::DescriptionFailed { side: "remote", reason: e.to_string() })
    }

    async fn inbound_stats(&self) -> Result<InboundSample, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(self.counters.sample(Instant::now()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Gen[{}] closing peer connection", self.generation);
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::CloseFailed { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn maps_every_ice_state() {
        assert_eq!(map_ice_state(RTCIceConnectionState::Checking), Some(TransportState::Checking));
        assert_eq!(map_ice_state(RTCIceConnectionState::Completed), Some(TransportState::Completed));
        assert_eq!(map_ice_state(RTCIceConnectionState::Failed), Some(TransportState::Failed));
        assert_eq!(map_ice_state(RTCIceConnectionState::Unspecified), None);
    }

    #[test]
    fn one_ice_server_entry_per_url() {
        let factory = RtcPeerFactory::new(vec![
            "stun:stun.l.google.com:19302".into(),
            "stun:stun1.l.google.com:19302".into(),
        ]);
        let cfg = factory.rtc_config();
        assert_eq!(cfg.ice_servers.len(), 2);
        assert_eq!(cfg.ice_servers[1].urls, vec!["stun:stun1.l.google.com:19302".to_string()]);
    }

    #[tokio::test]
    async fn offer_is_receive_only_video_and_audio() {
        let factory = RtcPeerFactory::new(Vec::new()).with_gather_timeout(Duration::from_secs(2));
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = factory.create(7, tx).await.expect("peer connection");

        let offer = session.create_offer().await.expect("offer");
        assert_eq!(offer.kind, "offer");
        assert!(offer.sdp.contains("m=video"));
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("a=recvonly"));
        assert!(!offer.sdp.contains("a=sendrecv"));

        session.close().await.expect("close");
        assert!(matches!(session.inbound_stats().await, Err(TransportError::Closed)));
    }

    #[test]
    fn close_is_idempotent() {
        tokio_test::block_on(async {
            let factory = RtcPeerFactory::new(Vec::new());
            let (tx, _rx) = mpsc::unbounded_channel();
            let session = factory.create(1, tx).await.expect("peer connection");
            session.close().await.expect("first close");
            session.close().await.expect("second close");
            let answer = SessionDescription::answer("v=0");
            assert!(matches!(
                session.set_remote_description(answer).await,
                Err(TransportError::Closed)
            ));
        });
    }
}
