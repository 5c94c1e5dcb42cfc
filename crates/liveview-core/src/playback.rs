use serde::{Deserialize, Serialize};

// MARK: - Quality

/// Quality preset picked in the quality selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Auto,
    High,
    Medium,
    Low,
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto"   => Ok(Self::Auto),
            "high"   => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low"    => Ok(Self::Low),
            other    => Err(format!("unknown quality: {other}")),
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto   => write!(f, "auto"),
            Self::High   => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low    => write!(f, "low"),
        }
    }
}

// MARK: - PlaybackSettings

/// Viewer-side playback preferences, re-applied to the sink on every track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub volume: f32,
    /// Starts muted so autoplay is allowed.
    pub muted: bool,
    #[serde(skip)]
    pub paused: bool,
    #[serde(alias = "autoQuality")]
    pub auto_quality: bool,
    pub quality: Quality,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume:       0.8,
            muted:        true,
            paused:       true,
            auto_quality: true,
            quality:      Quality::Auto,
        }
    }
}

impl PlaybackSettings {
    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    /// Set the volume, clamped to [0, 1]. Zero mutes; any audible level
    /// lifts an active mute.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume = volume;
        if volume == 0.0 {
            self.muted = true;
        } else if self.muted {
            self.muted = false;
        }
    }

    /// Relative volume change (arrow keys in the page use ±0.1).
    pub fn step_volume(&mut self, delta: f32) {
        self.set_volume(self.volume + delta);
    }

    pub fn set_auto_quality(&mut self, enabled: bool) {
        self.auto_quality = enabled;
        if enabled {
            self.quality = Quality::Auto;
        }
    }

    /// Record a manual quality choice. Returns `false` while auto quality is on.
    pub fn change_quality(&mut self, quality: Quality) -> bool {
        if self.auto_quality {
            return false;
        }
        self.quality = quality;
        true
    }
}
