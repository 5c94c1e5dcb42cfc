use serde::{Deserialize, Serialize};

/// Monotonic id of one connection attempt.
///
/// Every `start_connection` bumps it; callbacks, timers and handshake replies
/// carry the generation they were created for and are dropped on mismatch.
pub type Generation = u64;

// MARK: - ConnectionState

/// Lifecycle state as observed by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Streaming,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Short machine tag used by status indicators.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Idle         => "idle",
            Self::Connecting   => "connecting",
            Self::Connected    => "connected",
            Self::Streaming    => "streaming",
            Self::Disconnected => "disconnected",
            Self::Failed       => "failed",
            Self::Closed       => "closed",
        }
    }

    /// Transport is up (with or without both tracks).
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Streaming)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// MARK: - TransportState

/// ICE connection state reported by the peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl std::str::FromStr for TransportState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new"          => Ok(Self::New),
            "checking"     => Ok(Self::Checking),
            "connected"    => Ok(Self::Connected),
            "completed"    => Ok(Self::Completed),
            "disconnected" => Ok(Self::Disconnected),
            "failed"       => Ok(Self::Failed),
            "closed"       => Ok(Self::Closed),
            other          => Err(format!("unknown transport state: {other}")),
        }
    }
}

// MARK: - TrackKind

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// MARK: - SessionDescription

/// Offer/answer payload exchanged with the signaling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into(), kind: "offer".to_owned() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into(), kind: "answer".to_owned() }
    }

    pub fn is_answer(&self) -> bool {
        self.kind == "answer"
    }
}

// MARK: - Notice

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-facing message (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

// MARK: - ServerStatus

/// Result of the last health poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerStatus {
    #[default]
    Unknown,
    Online { active_peers: u32 },
    Offline,
}

impl ServerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown       => "-",
            Self::Online { .. } => "Online",
            Self::Offline       => "Offline",
        }
    }
}

// MARK: - Stats

/// Inbound RTP counters for one media kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InboundRtp {
    /// Cumulative payload bytes since the session started.
    pub bytes_received: u64,
    /// Only reported for video.
    pub frames_per_second: Option<f64>,
}

/// One stats poll of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InboundSample {
    pub video: Option<InboundRtp>,
    pub audio: Option<InboundRtp>,
}

/// Derived figures shown in the stats panel. `None` renders as "-".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub fps: Option<u32>,
    pub video_kbps: Option<u64>,
    pub audio_kbps: Option<u64>,
}
