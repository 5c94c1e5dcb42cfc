use crate::types::{InboundSample, StatsSnapshot};

/// Turns cumulative byte counters into per-poll bitrates.
///
/// A bitrate needs two consecutive samples, so the first poll after a
/// (re)connection yields `None` for that kind.
#[derive(Debug, Default)]
pub struct StatsMeter {
    last_video_bytes: Option<u64>,
    last_audio_bytes: Option<u64>,
}

impl StatsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one poll result and derive the display figures.
    pub fn sample(&mut self, sample: &InboundSample) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();

        if let Some(video) = sample.video {
            snapshot.fps = video.frames_per_second.map(|fps| fps.round().max(0.0) as u32);
            snapshot.video_kbps = self.last_video_bytes.map(|prev| kbps(prev, video.bytes_received));
            self.last_video_bytes = Some(video.bytes_received);
        }

        if let Some(audio) = sample.audio {
            snapshot.audio_kbps = self.last_audio_bytes.map(|prev| kbps(prev, audio.bytes_received));
            self.last_audio_bytes = Some(audio.bytes_received);
        }

        snapshot
    }

    /// Forget previous samples (between sessions).
    pub fn reset(&mut self) {
        self.last_video_bytes = None;
        self.last_audio_bytes = None;
    }
}

/// `Δbytes × 8 / 1000`, rounded. A counter that went backwards counts as zero.
pub fn kbps(previous: u64, current: u64) -> u64 {
    let delta = current.saturating_sub(previous);
    (delta as f64 * 8.0 / 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InboundRtp;

    fn sample(video_bytes: u64, audio_bytes: u64) -> InboundSample {
        InboundSample {
            video: Some(InboundRtp { bytes_received: video_bytes, frames_per_second: Some(29.6) }),
            audio: Some(InboundRtp { bytes_received: audio_bytes, frames_per_second: None }),
        }
    }

    #[test]
    fn first_sample_has_no_bitrate() {
        let mut meter = StatsMeter::new();
        let snap = meter.sample(&sample(10_000, 2_000));
        assert_eq!(snap.fps, Some(30));
        assert_eq!(snap.video_kbps, None);
        assert_eq!(snap.audio_kbps, None);
    }

    #[test]
    fn derives_kbps_from_consecutive_samples() {
        let mut meter = StatsMeter::new();
        meter.sample(&sample(10_000, 2_000));
        let snap = meter.sample(&sample(322_500, 18_000));
        assert_eq!(snap.video_kbps, Some(2_500));
        assert_eq!(snap.audio_kbps, Some(128));
    }

    #[test]
    fn zero_delta_is_zero_kbps() {
        let mut meter = StatsMeter::new();
        meter.sample(&sample(5_000, 5_000));
        let snap = meter.sample(&sample(5_000, 5_000));
        assert_eq!(snap.video_kbps, Some(0));
        assert_eq!(snap.audio_kbps, Some(0));
    }

    #[test]
    fn reset_forgets_history() {
        let mut meter = StatsMeter::new();
        meter.sample(&sample(5_000, 5_000));
        meter.reset();
        let snap = meter.sample(&sample(9_000, 9_000));
        assert_eq!(snap.video_kbps, None);
    }

    #[test]
    fn counter_going_backwards_is_clamped() {
        assert_eq!(kbps(10_000, 4_000), 0);
        assert_eq!(kbps(0, 62), 0);
        assert_eq!(kbps(0, 63), 1);
    }
}
