//! Engine settings.
//!
//! Settings are plain serde structs, usually read from a TOML file:
//!
//! ```toml
//! url = "https://hub.example.org"
//! envelope = true
//! publish_timeout_ms = 5000
//! auto_reconnect_interval_ms = 15000
//! ```

use std::path::Path;
use std::time::Duration;

use hublink_protocol::{Framing, envelope_path};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::error::ConfigError;

/// Lower bound of the auto-reconnect interval.
pub const MIN_AUTO_RECONNECT_INTERVAL_MS: u64 = 10_000;

/// Connection engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Hub URL. `http`/`https` are accepted and mapped to `ws`/`wss`.
    pub url: String,

    /// Wrap messages in SockJS frames.
    pub envelope: bool,

    /// How long to wait for the handshake.
    pub connect_timeout_ms: u64,

    /// How long to wait for a registration acknowledgement.
    pub registration_timeout_ms: u64,

    /// How long to wait for a publish acknowledgement.
    pub publish_timeout_ms: u64,

    /// Keep-alive period while connected.
    pub heartbeat_interval_ms: u64,

    /// Reconnect after the hub drops the connection.
    pub auto_reconnect: bool,

    /// Delay between reconnect attempts.
    pub auto_reconnect_interval_ms: u64,

    /// Maximum number of cached events per service.
    pub event_cache_capacity: usize,

    /// Buffer size of the notification channel.
    pub notification_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8085".to_string(),
            envelope: true,
            connect_timeout_ms: 3_000,
            registration_timeout_ms: 10_000,
            publish_timeout_ms: 10_000,
            heartbeat_interval_ms: 5_000,
            auto_reconnect: true,
            auto_reconnect_interval_ms: MIN_AUTO_RECONNECT_INTERVAL_MS,
            event_cache_capacity: 1_000,
            notification_capacity: 256,
        }
    }
}

impl EngineSettings {
    /// Creates default settings for the given hub URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Loads settings from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses settings from TOML; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Self>(content)?.normalized())
    }

    /// Returns a copy with out-of-range values corrected.
    pub fn normalized(mut self) -> Self {
        if self.auto_reconnect_interval_ms < MIN_AUTO_RECONNECT_INTERVAL_MS {
            warn!(
                requested_ms = self.auto_reconnect_interval_ms,
                minimum_ms = MIN_AUTO_RECONNECT_INTERVAL_MS,
                "auto reconnect interval below minimum, clamping"
            );
            self.auto_reconnect_interval_ms = MIN_AUTO_RECONNECT_INTERVAL_MS;
        }
        if self.notification_capacity == 0 {
            self.notification_capacity = 1;
        }
        self
    }

    /// Builder: set envelope framing.
    pub fn with_envelope(mut self, envelope: bool) -> Self {
        self.envelope = envelope;
        self
    }

    /// Builder: set the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set the registration timeout.
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set the publish timeout.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder: enable or disable auto-reconnect.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Builder: set the reconnect interval (clamped to the minimum).
    pub fn with_auto_reconnect_interval(mut self, interval: Duration) -> Self {
        self.auto_reconnect_interval_ms = interval.as_millis() as u64;
        self.normalized()
    }

    /// Builder: set the per-service cache capacity.
    pub fn with_event_cache_capacity(mut self, capacity: usize) -> Self {
        self.event_cache_capacity = capacity;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn auto_reconnect_interval(&self) -> Duration {
        Duration::from_millis(
            self.auto_reconnect_interval_ms
                .max(MIN_AUTO_RECONNECT_INTERVAL_MS),
        )
    }

    pub fn framing(&self) -> Framing {
        if self.envelope {
            Framing::Envelope
        } else {
            Framing::Plain
        }
    }

    /// The hub URL with a WebSocket scheme and an explicit port.
    pub fn hub_url(&self) -> Result<Url, ConfigError> {
        let raw = self.url.trim();
        let mapped = if let Some(rest) = raw.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = raw.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            raw.to_string()
        };

        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason,
        };
        let mut url = Url::parse(&mapped).map_err(|e| invalid(e.to_string()))?;
        let default_port = match url.scheme() {
            "ws" => 80,
            "wss" => 443,
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        if url.port().is_none() {
            url.set_port(Some(default_port))
                .map_err(|()| invalid("cannot set port".to_string()))?;
        }
        Ok(url)
    }

    /// URL for one connection attempt.
    ///
    /// In envelope mode every attempt gets a fresh SockJS server and
    /// session id.
    pub fn connect_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.hub_url()?;
        if !self.envelope {
            return Ok(url);
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let server_id = rand::rng().random_range(100..1000);
        let session_id = Uuid::new_v4().simple().to_string();
        url.join(&envelope_path(server_id, &session_id))
            .map_err(|e| ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let settings = EngineSettings::default();
        assert!(settings.envelope);
        assert!(settings.auto_reconnect);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(3));
        assert_eq!(settings.registration_timeout(), Duration::from_secs(10));
        assert_eq!(settings.publish_timeout(), Duration::from_secs(10));
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(settings.auto_reconnect_interval(), Duration::from_secs(10));
        assert_eq!(settings.event_cache_capacity, 1000);
    }

    #[test]
    fn parses_partial_toml() {
        let settings = EngineSettings::from_toml_str(
            r#"
            url = "https://hub.example.org"
            envelope = false
            publish_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(settings.url, "https://hub.example.org");
        assert!(!settings.envelope);
        assert_eq!(settings.publish_timeout(), Duration::from_millis(2500));
        assert_eq!(settings.connect_timeout_ms, 3000);
    }

    #[test]
    fn reconnect_interval_is_clamped() {
        let settings = EngineSettings::from_toml_str("auto_reconnect_interval_ms = 500").unwrap();
        assert_eq!(settings.auto_reconnect_interval_ms, MIN_AUTO_RECONNECT_INTERVAL_MS);

        let settings = EngineSettings::default()
            .with_auto_reconnect_interval(Duration::from_secs(30));
        assert_eq!(settings.auto_reconnect_interval(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(matches!(
            EngineSettings::from_toml_str("connect_timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "url = \"ws://10.0.0.1:8085\"").unwrap();
        writeln!(file, "event_cache_capacity = 5").unwrap();

        let settings = EngineSettings::load_from(file.path()).unwrap();
        assert_eq!(settings.event_cache_capacity, 5);
        assert!(matches!(
            EngineSettings::load_from("/nonexistent/hublink.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn http_schemes_map_to_websocket() {
        let url = EngineSettings::new("http://hub.local").hub_url().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port_or_known_default(), Some(80));

        let url = EngineSettings::new("https://hub.local").hub_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.port_or_known_default(), Some(443));

        let url = EngineSettings::new("ws://hub.local:8085").hub_url().unwrap();
        assert_eq!(url.port(), Some(8085));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            EngineSettings::new("ftp://hub.local").hub_url(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(EngineSettings::new("not a url").hub_url().is_err());
    }

    #[test]
    fn envelope_url_has_sockjs_suffix() {
        let url = EngineSettings::new("ws://hub.local:8085/msb")
            .connect_url()
            .unwrap();
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments[0], "msb");
        assert_eq!(segments[1], "websocket");
        assert_eq!(segments[2], "data");
        assert_eq!(segments[3].len(), 3);
        assert_eq!(segments[4].len(), 32);
        assert_eq!(segments[5], "websocket");

        let plain = EngineSettings::new("ws://hub.local:8085")
            .with_envelope(false)
            .connect_url()
            .unwrap();
        assert_eq!(plain.path(), "/");
    }
}
