use std::time::Duration;

use async_trait::async_trait;
use liveview_core::{HealthError, ServerStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body of `GET /health`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub active_peers: Option<u32>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    pub fn server_status(&self) -> ServerStatus {
        if self.is_healthy() {
            ServerStatus::Online { active_peers: self.active_peers.unwrap_or(0) }
        } else {
            ServerStatus::Offline
        }
    }
}

// MARK: - HealthProbe

/// One health check against the relay server.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<HealthReport, HealthError>;
}

// MARK: - HttpHealthProbe

#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpHealthProbe {
    pub fn new(health_url: impl Into<String>, timeout: Duration) -> Result<Self, HealthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HealthError::Request(e.to_string()))?;
        Ok(Self { client, health_url: health_url.into() })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> Result<HealthReport, HealthError> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| HealthError::Request(e.to_string()))?;

        // The server answers 503 with a full report when unhealthy, so the
        // body is read regardless of the status code.
        let status = response.status();
        let body = response.bytes().await.map_err(|e| HealthError::Request(e.to_string()))?;
        let report: HealthReport =
            serde_json::from_slice(&body).map_err(|e| HealthError::Body(e.to_string()))?;
        debug!("GET {} → {} ({:?})", self.health_url, status, report);
        Ok(report)
    }
}
