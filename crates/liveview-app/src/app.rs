use std::sync::Arc;

use anyhow::{Context, Result};
use liveview_core::ViewerConfig;
use liveview_player::{Collaborators, ConnectionManager};
use liveview_signaling::{HttpHealthProbe, HttpSignaling};
use liveview_webrtc::RtcPeerFactory;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::console::{ConsoleNotifier, ConsoleSink};
use crate::controls::{self, Control};

/// Viewer main loop.
///
/// # Flow
/// 1. Load `ViewerConfig` from `LIVEVIEW_*` variables (or `LIVEVIEW_CONFIG` JSON)
/// 2. Build the HTTP signaling client, health probe and webrtc-rs factory
/// 3. Spawn the connection manager (first attempt starts immediately)
/// 4. Forward stdin commands until `quit`, EOF + Ctrl-C, or Ctrl-C
/// 5. Tear down: close the session, stop timers and health polling
pub async fn run() -> Result<()> {
    let config = ViewerConfig::from_env().context("invalid viewer configuration")?;
    info!(
        "Server {} | ICE servers: {} | reconnect: {} attempts from {} ms",
        config.base_url(),
        config.ice_servers.join(", "),
        config.reconnect.max_attempts,
        config.reconnect.base_delay_ms
    );

    let signaling = HttpSignaling::new(config.offer_url(), config.request_timeout())
        .context("building signaling client")?;
    let probe = HttpHealthProbe::new(config.health_url(), config.request_timeout())
        .context("building health probe")?;
    let factory = RtcPeerFactory::new(config.ice_servers.clone());

    let manager = ConnectionManager::new(
        &config,
        Collaborators {
            factory: Arc::new(factory),
            signaling: Arc::new(signaling),
            sink: Arc::new(ConsoleSink::default()),
            notifier: Arc::new(ConsoleNotifier),
        },
    )
    .with_health_probe(Arc::new(probe));
    let (handle, task) = manager.spawn();

    controls::print_help();

    // ── Control loop ───────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("reading stdin")? else {
                    info!("stdin closed; Ctrl-C to quit");
                    stdin_open = false;
                    continue;
                };
                match controls::parse(&line) {
                    Some(Control::Quit) => break,
                    Some(Control::Help) => controls::print_help(),
                    Some(Control::Status) => {
                        let status = handle.status();
                        info!(
                            "State: {} | gen {} | tracks {} | reconnect attempts {}",
                            status.state, status.generation, status.tracks, status.attempts
                        );
                    }
                    Some(Control::Command(command)) => {
                        if !handle.send(command).await {
                            warn!("Connection manager is gone");
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Unknown command '{}' (h for help)", line.trim()),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("installing Ctrl-C handler")?;
                info!("Ctrl-C received");
                break;
            }
        }
    }

    handle.shutdown().await;
    task.await.context("connection manager task failed")?;
    Ok(())
}
