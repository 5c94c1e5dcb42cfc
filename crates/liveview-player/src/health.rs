use std::sync::Arc;
use std::time::Duration;

use liveview_core::{Notice, ServerStatus};
use liveview_signaling::HealthProbe;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::manager::ManagerStatus;
use crate::Notifier;

/// Periodic server health ping. Independent of the connection lifecycle:
/// results only reach the notifier.
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        Self { probe, notifier, interval }
    }

    /// One probe. `connected` decides whether an unhealthy report is worth a
    /// warning.
    pub async fn check_once(&self, connected: bool) -> ServerStatus {
        let status = match self.probe.check().await {
            Ok(report) => {
                debug!("Health: {} (active peers {:?})", report.status, report.active_peers);
                if !report.is_healthy() && connected {
                    warn!("Server reports '{}' while connected", report.status);
                    self.notifier
                        .notice(&Notice::warning(format!("Server health: {}", report.status)));
                }
                report.server_status()
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                ServerStatus::Offline
            }
        };
        self.notifier.server_status(&status);
        status
    }

    /// Probe now, then every interval, until the task is aborted.
    pub async fn run(self, status: watch::Receiver<ManagerStatus>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let connected = status.borrow().state.is_connected();
            self.check_once(connected).await;
        }
    }
}
