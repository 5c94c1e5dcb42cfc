use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::playback::PlaybackSettings;
use crate::policy::ReconnectPolicy;

/// Public STUN servers used when none are configured.
pub const DEFAULT_ICE_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Base URL of the relay server (`/offer` and `/health` live under it).
    #[serde(alias = "serverUrl")]
    pub server_url: String,
    #[serde(alias = "iceServers")]
    pub ice_servers: Vec<String>,
    pub reconnect: ReconnectPolicy,
    #[serde(alias = "statsIntervalMs")]
    pub stats_interval_ms: u64,
    #[serde(alias = "healthIntervalMs")]
    pub health_interval_ms: u64,
    #[serde(alias = "requestTimeoutMs")]
    pub request_timeout_ms: u64,
    pub playback: PlaybackSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url:         "http://127.0.0.1:8080".to_owned(),
            ice_servers:        DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
            reconnect:          ReconnectPolicy::default(),
            stats_interval_ms:  1_000,
            health_interval_ms: 30_000,
            request_timeout_ms: 10_000,
            playback:           PlaybackSettings::default(),
        }
    }
}

impl ViewerConfig {
    /// Load from the process environment.
    ///
    /// `LIVEVIEW_CONFIG` names an optional JSON file used as the base; the
    /// individual `LIVEVIEW_*` variables override it.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = match lookup("LIVEVIEW_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(url) = lookup("LIVEVIEW_SERVER_URL") {
            cfg.server_url = url;
        }
        if let Some(list) = lookup("LIVEVIEW_ICE_SERVERS") {
            cfg.ice_servers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = lookup("LIVEVIEW_MAX_RECONNECTS") {
            cfg.reconnect.max_attempts = parse_num("LIVEVIEW_MAX_RECONNECTS", &v)?;
        }
        if let Some(v) = lookup("LIVEVIEW_RECONNECT_DELAY_MS") {
            cfg.reconnect.base_delay_ms = parse_num("LIVEVIEW_RECONNECT_DELAY_MS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Unreadable {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidServerUrl {
                url: self.server_url.clone(),
                reason: "expected an http:// or https:// URL".into(),
            });
        }
        for (key, value) in [
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
            ("stats_interval_ms", self.stats_interval_ms),
            ("health_interval_ms", self.health_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    /// `server_url` with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }

    pub fn offer_url(&self) -> String {
        format!("{}/offer", self.base_url())
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_page() {
        let cfg = ViewerConfig::default();
        assert_eq!(cfg.ice_servers.len(), 2);
        assert_eq!(cfg.reconnect.max_attempts, 5);
        assert_eq!(cfg.reconnect.base_delay_ms, 1_000);
        assert_eq!(cfg.health_interval(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ViewerConfig::from_lookup(lookup(&[
            ("LIVEVIEW_SERVER_URL", "https://relay.example:8443/"),
            ("LIVEVIEW_ICE_SERVERS", "stun:a:3478, stun:b:3478,"),
            ("LIVEVIEW_MAX_RECONNECTS", "3"),
            ("LIVEVIEW_RECONNECT_DELAY_MS", "500"),
        ]))
        .expect("valid env");

        assert_eq!(cfg.offer_url(), "https://relay.example:8443/offer");
        assert_eq!(cfg.health_url(), "https://relay.example:8443/health");
        assert_eq!(cfg.ice_servers, vec!["stun:a:3478", "stun:b:3478"]);
        assert_eq!(cfg.reconnect.max_attempts, 3);
        assert_eq!(cfg.reconnect.base_delay_ms, 500);
    }

    #[test]
    fn rejects_bad_values() {
        let err = ViewerConfig::from_lookup(lookup(&[("LIVEVIEW_MAX_RECONNECTS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ViewerConfig::from_lookup(lookup(&[("LIVEVIEW_SERVER_URL", "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServerUrl { .. }));

        let err = ViewerConfig::from_lookup(lookup(&[("LIVEVIEW_RECONNECT_DELAY_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "serverUrl": "http://10.0.0.2:8080",
            "reconnect": {"baseDelayMs": 2000, "maxAttempts": 7},
            "statsIntervalMs": 500,
            "playback": {"volume": 0.5, "muted": false}
        }"#;
        let cfg: ViewerConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.server_url, "http://10.0.0.2:8080");
        assert_eq!(cfg.reconnect.max_attempts, 7);
        assert_eq!(cfg.reconnect.attempts(), 0);
        assert_eq!(cfg.stats_interval_ms, 500);
        assert!(!cfg.playback.muted);
        assert_eq!(cfg.health_interval_ms, 30_000);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = ViewerConfig::from_lookup(lookup(&[(
            "LIVEVIEW_CONFIG",
            "/nonexistent/liveview.json",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
