use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Failures of the offer/answer round trip.
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("HTTP error! status: {status}")]
    Status { status: u16 },

    #[error("Malformed answer: {reason}")]
    MalformedAnswer { reason: String },

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to create peer connection: {reason}")]
    CreateFailed { reason: String },

    #[error("Failed to create offer: {reason}")]
    OfferFailed { reason: String },

    #[error("Failed to apply {side} description: {reason}")]
    DescriptionFailed { side: &'static str, reason: String },

    #[error("Failed to close peer connection: {reason}")]
    CloseFailed { reason: String },

    #[error("Connection closed")]
    Closed,
}

/// Local, non-fatal media sink errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playback was blocked: {reason}")]
    Rejected { reason: String },

    #[error("No stream attached")]
    NoStream,
}

/// Health polling failures. Never leave the health monitor; mapped to Offline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Health request failed: {0}")]
    Request(String),

    #[error("Unreadable health body: {0}")]
    Body(String),
}
