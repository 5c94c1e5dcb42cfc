use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use liveview_core::{InboundRtp, InboundSample};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Inbound byte/frame counters fed by the track reader tasks.
#[derive(Debug, Default)]
pub struct InboundCounters {
    video_seen:  AtomicBool,
    audio_seen:  AtomicBool,
    video_bytes: AtomicU64,
    audio_bytes: AtomicU64,
    /// Completion times of recent video frames (RTP marker bit).
    frame_times: Mutex<VecDeque<Instant>>,
}

impl InboundCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one video RTP packet. `end_of_frame` is the RTP marker bit.
    pub fn record_video(&self, payload_len: usize, end_of_frame: bool, now: Instant) {
        self.video_seen.store(true, Ordering::Relaxed);
        self.video_bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
        if end_of_frame {
            let mut times = self.frame_times.lock().unwrap_or_else(|e| e.into_inner());
            times.push_back(now);
            evict(&mut times, now);
        }
    }

    pub fn record_audio(&self, payload_len: usize) {
        self.audio_seen.store(true, Ordering::Relaxed);
        self.audio_bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// Current cumulative counters. Kinds with no packet yet are `None`.
    pub fn sample(&self, now: Instant) -> InboundSample {
        let video = self.video_seen.load(Ordering::Relaxed).then(|| {
            let mut times = self.frame_times.lock().unwrap_or_else(|e| e.into_inner());
            evict(&mut times, now);
            InboundRtp {
                bytes_received: self.video_bytes.load(Ordering::Relaxed),
                frames_per_second: Some(times.len() as f64),
            }
        });
        let audio = self.audio_seen.load(Ordering::Relaxed).then(|| InboundRtp {
            bytes_received: self.audio_bytes.load(Ordering::Relaxed),
            frames_per_second: None,
        });
        InboundSample { video, audio }
    }
}

// Drop frames older than the window.
fn evict(times: &mut VecDeque<Instant>, now: Instant) {
    while times
        .front()
        .map_or(false, |t| now.saturating_duration_since(*t) > FPS_WINDOW)
    {
        times.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counters_report_nothing() {
        let c = InboundCounters::new();
        assert_eq!(c.sample(Instant::now()), InboundSample::default());
    }

    #[test]
    fn accumulates_bytes_per_kind() {
        let c = InboundCounters::new();
        let now = Instant::now();
        c.record_video(1_200, false, now);
        c.record_video(800, true, now);
        c.record_audio(160);
        c.record_audio(160);

        let s = c.sample(now);
        assert_eq!(s.video.map(|v| v.bytes_received), Some(2_000));
        assert_eq!(s.audio.map(|a| a.bytes_received), Some(320));
        assert_eq!(s.audio.and_then(|a| a.frames_per_second), None);
    }

    #[test]
    fn fps_counts_frames_in_the_last_second() {
        let c = InboundCounters::new();
        let start = Instant::now();
        for i in 0..30u64 {
            c.record_video(100, true, start + Duration::from_millis(i * 33));
        }
        let s = c.sample(start + Duration::from_millis(990));
        assert_eq!(s.video.and_then(|v| v.frames_per_second), Some(30.0));

        let later = c.sample(start + Duration::from_millis(2_500));
        assert_eq!(later.video.and_then(|v| v.frames_per_second), Some(0.0));
    }
}
