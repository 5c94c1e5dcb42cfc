//! `POST /offer` signaling over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use liveview_core::{SessionDescription, SignalingError};
use tracing::{debug, info};

use crate::Signaling;

/// JSON-over-HTTP signaling client.
#[derive(Debug, Clone)]
pub struct HttpSignaling {
    client: reqwest::Client,
    offer_url: String,
    timeout: Duration,
}

impl HttpSignaling {
    pub fn new(offer_url: impl Into<String>, timeout: Duration) -> Result<Self, SignalingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignalingError::Network(e.to_string()))?;
        Ok(Self { client, offer_url: offer_url.into(), timeout })
    }

    pub fn offer_url(&self) -> &str {
        &self.offer_url
    }

    fn map_err(&self, e: reqwest::Error) -> SignalingError {
        if e.is_timeout() {
            SignalingError::Timeout { ms: self.timeout.as_millis() as u64 }
        } else {
            SignalingError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, SignalingError> {
        debug!("POST {} ({} bytes of SDP)", self.offer_url, offer.sdp.len());

        let response = self
            .client
            .post(&self.offer_url)
            .json(offer)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalingError::Status { status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(|e| self.map_err(e))?;
        let answer = parse_answer(&body)?;
        info!("Received {} ({} bytes of SDP)", answer.kind, answer.sdp.len());
        Ok(answer)
    }
}

/// Decode and sanity-check the remote description.
pub fn parse_answer(body: &[u8]) -> Result<SessionDescription, SignalingError> {
    let answer: SessionDescription = serde_json::from_slice(body)
        .map_err(|e| SignalingError::MalformedAnswer { reason: e.to_string() })?;
    if answer.sdp.trim().is_empty() {
        return Err(SignalingError::MalformedAnswer { reason: "empty sdp".into() });
    }
    if !answer.is_answer() {
        return Err(SignalingError::MalformedAnswer {
            reason: format!("expected type 'answer', got '{}'", answer.kind),
        });
    }
    Ok(answer)
}
