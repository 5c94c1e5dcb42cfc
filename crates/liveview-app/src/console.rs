//! Console stand-ins for the page: log lines instead of DOM updates.

use std::sync::Mutex;

use async_trait::async_trait;
use liveview_core::{
    ConnectionState, Notice, NoticeLevel, PlaybackError, PlaybackSettings, ServerStatus,
    StatsSnapshot,
};
use liveview_player::{MediaSink, Notifier};
use tracing::{error, info, warn};

// MARK: - Notifier

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn connection_state(&self, state: ConnectionState, message: &str) {
        info!("[status] {} ({})", message, state.tag());
    }

    fn notice(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Error => error!("[notice] {}", notice.message),
            NoticeLevel::Warning => warn!("[notice] {}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => info!("[notice] {}", notice.message),
        }
    }

    fn tracks(&self, count: u32) {
        info!("[tracks] {}/2", count);
    }

    fn reconnect_available(&self, visible: bool) {
        if visible {
            info!("[reconnect] type 'r' to reconnect");
        }
    }

    fn stats(&self, snapshot: &StatsSnapshot) {
        if *snapshot != StatsSnapshot::default() {
            info!("[stats] {}", format_stats(snapshot));
        }
    }

    fn server_status(&self, status: &ServerStatus) {
        match status {
            ServerStatus::Online { active_peers } => {
                info!("[server] {} ({} active peers)", status.label(), active_peers)
            }
            _ => info!("[server] {}", status.label()),
        }
    }

    fn playback(&self, settings: &PlaybackSettings) {
        info!(
            "[playback] {} | volume {:.0}%{} | quality {}{}",
            if settings.paused { "paused" } else { "playing" },
            settings.volume * 100.0,
            if settings.muted { " (muted)" } else { "" },
            settings.quality,
            if settings.auto_quality { " (auto)" } else { "" },
        );
    }
}

/// `fps 30 | video 2450 kbps | audio 128 kbps`, `-` for unknown figures.
pub fn format_stats(snapshot: &StatsSnapshot) -> String {
    fn or_dash<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "-".to_owned(), |v| v.to_string())
    }
    format!(
        "fps {} | video {} kbps | audio {} kbps",
        or_dash(snapshot.fps),
        or_dash(snapshot.video_kbps),
        or_dash(snapshot.audio_kbps)
    )
}

// MARK: - Sink

/// Tracks what a player element would hold; nothing is rendered.
#[derive(Default)]
pub struct ConsoleSink {
    stream: Mutex<Option<String>>,
}

#[async_trait]
impl MediaSink for ConsoleSink {
    fn attach(&self, stream_id: &str) {
        *self.stream.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream_id.to_owned());
    }

    fn detach(&self) {
        *self.stream.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn apply(&self, _settings: &PlaybackSettings) {}

    async fn play(&self) -> Result<(), PlaybackError> {
        let stream = self.stream.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match stream {
            Some(id) => {
                info!("Playing stream {}", id);
                Ok(())
            }
            None => Err(PlaybackError::NoStream),
        }
    }

    fn pause(&self) {
        info!("Paused");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_line_uses_dashes_for_unknown() {
        assert_eq!(
            format_stats(&StatsSnapshot::default()),
            "fps - | video - kbps | audio - kbps"
        );
        let s = StatsSnapshot { fps: Some(30), video_kbps: Some(2_450), audio_kbps: Some(0) };
        assert_eq!(format_stats(&s), "fps 30 | video 2450 kbps | audio 0 kbps");
    }

    #[tokio::test]
    async fn sink_plays_only_with_a_stream() {
        let sink = ConsoleSink::default();
        assert_eq!(sink.play().await, Err(PlaybackError::NoStream));
        sink.attach("relay");
        assert_eq!(sink.play().await, Ok(()));
        sink.detach();
        assert_eq!(sink.play().await, Err(PlaybackError::NoStream));
    }
}
