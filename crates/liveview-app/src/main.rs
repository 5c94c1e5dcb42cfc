use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod console;
mod controls;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=debug for per-event detail (ICE states, stale events, retries)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    info!("LiveView v{}", env!("CARGO_PKG_VERSION"));

    match app::run().await {
        Ok(()) => {
            info!("LiveView exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
