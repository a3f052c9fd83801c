//! Relay configuration.
//!
//! Everything is read once at startup from the environment (after `.env` has
//! been loaded), falling back to defaults that match a local single-operator
//! setup.
//!
//! Supported env vars:
//! - `SOURCE_BINARY`, `TRANSFORM_BINARY`: downloader and ffmpeg executables
//! - `RELAY_TARGET_URL`, `RELAY_STREAM_KEY`: publishing destination
//! - `RELAY_PROXY`: proxy handed to the downloader
//! - `RELAY_OVERLAY_PATH`: overlay image used until one is uploaded
//! - `RELAY_PUBLIC_DIR`, `RELAY_UPLOAD_DIR`: dashboard and upload directories
//! - `RELAY_MAX_SEEK_RETRIES`: automatic no-seek retries per session
//! - `API_BIND_ADDRESS`, `API_PORT`: HTTP listener
//! - `LOG_DIR`: rolling log file directory

use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiServerConfig;
use crate::{Error, Result};

/// Default publishing endpoint (RTMP ingest).
pub const DEFAULT_TARGET_URL: &str = "rtmp://a.rtmp.youtube.com/live2";

/// Default number of automatic seek-less retries per logical session.
pub const DEFAULT_MAX_SEEK_RETRIES: u32 = 3;

#[cfg(windows)]
const DEFAULT_SOURCE_BINARY: &str = "yt-dlp.exe";
#[cfg(not(windows))]
const DEFAULT_SOURCE_BINARY: &str = "yt-dlp";

#[cfg(windows)]
const DEFAULT_TRANSFORM_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const DEFAULT_TRANSFORM_BINARY: &str = "ffmpeg";

/// Delays and windows driving the supervisor's recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTimings {
    /// Delay between tearing down a pair and spawning on `start`/`change_source`.
    pub start_settle: Duration,
    /// Delay before respawning on an overlay hot-swap.
    pub hot_swap_settle: Duration,
    /// Delay before the seek-less retry after a fast crash.
    pub retry_delay: Duration,
    /// How long the transform may keep draining after the source finished.
    pub drain_grace: Duration,
    /// A non-zero source exit within this window counts as a fast crash.
    pub fast_crash_window: Duration,
    /// Offsets at or below this are not worth a seek directive.
    pub min_seek: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            start_settle: Duration::from_millis(1000),
            hot_swap_settle: Duration::from_millis(1500),
            retry_delay: Duration::from_millis(1000),
            drain_grace: Duration::from_secs(30),
            fast_crash_window: Duration::from_millis(5000),
            min_seek: Duration::from_secs(5),
        }
    }
}

/// Where and how the transform process publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub target_url: String,
    pub stream_key: String,
    /// Output canvas, portrait by default.
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub video_preset: String,
    pub video_bitrate: String,
    pub max_rate: String,
    pub buf_size: String,
    pub gop: u32,
    pub audio_bitrate: String,
    pub audio_rate: u32,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            stream_key: String::new(),
            canvas_width: 1080,
            canvas_height: 1920,
            video_preset: "ultrafast".to_string(),
            video_bitrate: "4500k".to_string(),
            max_rate: "5000k".to_string(),
            buf_size: "10000k".to_string(),
            gop: 60,
            audio_bitrate: "128k".to_string(),
            audio_rate: 44100,
        }
    }
}

impl PublishConfig {
    /// Full ingest URL handed to the transform process.
    pub fn destination(&self) -> String {
        format!(
            "{}/{}",
            self.target_url.trim_end_matches('/'),
            self.stream_key
        )
    }
}

/// Settings owned by the pipeline supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub source_binary: String,
    pub transform_binary: String,
    pub proxy: Option<String>,
    /// Overlay used until an operator uploads one.
    pub default_overlay: PathBuf,
    pub publish: PublishConfig,
    pub timings: SupervisorTimings,
    pub max_seek_retries: u32,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            source_binary: DEFAULT_SOURCE_BINARY.to_string(),
            transform_binary: DEFAULT_TRANSFORM_BINARY.to_string(),
            proxy: None,
            default_overlay: PathBuf::from("overlay.png"),
            publish: PublishConfig::default(),
            timings: SupervisorTimings::default(),
            max_seek_retries: DEFAULT_MAX_SEEK_RETRIES,
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub supervisor: SupervisorSettings,
    pub api: ApiServerConfig,
    /// Static dashboard directory.
    pub public_dir: PathBuf,
    /// Uploaded overlays land here; served under `/uploads`.
    pub upload_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSettings::default(),
            api: ApiServerConfig::default(),
            public_dir: PathBuf::from("public"),
            upload_dir: PathBuf::from("public").join("uploads"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        let supervisor = &mut config.supervisor;

        if let Some(binary) = get("SOURCE_BINARY") {
            supervisor.source_binary = binary;
        }
        if let Some(binary) = get("TRANSFORM_BINARY") {
            supervisor.transform_binary = binary;
        }
        supervisor.proxy = get("RELAY_PROXY");
        if let Some(path) = get("RELAY_OVERLAY_PATH") {
            supervisor.default_overlay = PathBuf::from(path);
        }
        if let Some(url) = get("RELAY_TARGET_URL") {
            supervisor.publish.target_url = url;
        }
        if let Some(key) = get("RELAY_STREAM_KEY") {
            supervisor.publish.stream_key = key;
        }
        if let Some(retries) = get("RELAY_MAX_SEEK_RETRIES") {
            supervisor.max_seek_retries = retries.parse().map_err(|_| {
                Error::config(format!(
                    "RELAY_MAX_SEEK_RETRIES must be a non-negative integer, got '{}'",
                    retries
                ))
            })?;
        }

        if let Some(dir) = get("RELAY_PUBLIC_DIR") {
            config.public_dir = PathBuf::from(dir);
            config.upload_dir = config.public_dir.join("uploads");
        }
        if let Some(dir) = get("RELAY_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.api.bind_address = bind_address;
        }
        if let Some(port) = get("API_PORT") {
            config.api.port = port.parse().map_err(|_| {
                Error::config(format!("API_PORT must be a port number, got '{}'", port))
            })?;
        }

        if !config.supervisor.publish.target_url.contains("://") {
            return Err(Error::config(format!(
                "RELAY_TARGET_URL must be a URL, got '{}'",
                config.supervisor.publish.target_url
            )));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.supervisor.publish.target_url, DEFAULT_TARGET_URL);
        assert_eq!(config.supervisor.max_seek_retries, DEFAULT_MAX_SEEK_RETRIES);
        assert_eq!(config.upload_dir, PathBuf::from("public").join("uploads"));
        assert!(config.supervisor.proxy.is_none());
        assert_eq!(config.api.bind_address, "0.0.0.0");
        assert_eq!(config.api.port, 3000);
    }

    #[test]
    fn test_api_listener_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("API_BIND_ADDRESS", "127.0.0.1"),
            ("API_PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.api.bind_address, "127.0.0.1");
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_invalid_api_port_rejected() {
        let err = RelayConfig::from_lookup(lookup(&[("API_PORT", "70000")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("SOURCE_BINARY", "/opt/yt-dlp"),
            ("RELAY_STREAM_KEY", "abcd-1234"),
            ("RELAY_PROXY", "  http://proxy:8080 "),
            ("RELAY_PUBLIC_DIR", "/srv/www"),
            ("RELAY_MAX_SEEK_RETRIES", "1"),
        ]))
        .unwrap();

        assert_eq!(config.supervisor.source_binary, "/opt/yt-dlp");
        assert_eq!(config.supervisor.proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(config.upload_dir, PathBuf::from("/srv/www").join("uploads"));
        assert_eq!(config.supervisor.max_seek_retries, 1);
        assert_eq!(
            config.supervisor.publish.destination(),
            "rtmp://a.rtmp.youtube.com/live2/abcd-1234"
        );
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[("RELAY_PROXY", "   ")])).unwrap();
        assert!(config.supervisor.proxy.is_none());
    }

    #[test]
    fn test_invalid_retry_count_rejected() {
        let err = RelayConfig::from_lookup(lookup(&[("RELAY_MAX_SEEK_RETRIES", "many")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_invalid_target_url_rejected() {
        let err = RelayConfig::from_lookup(lookup(&[("RELAY_TARGET_URL", "youtube")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
