use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub bus: BusConfig,
    pub keepalive: KeepAliveConfig,
    pub bridge: BridgeConfig,
    pub capture: CaptureConfig,
    pub transcription: TranscriptionConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "tab-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// All contexts in this process
    Memory,
    /// Contexts connected through a NATS server
    Nats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub nats_url: String,
    pub subject_prefix: String,
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "recorder".to_string(),
            capacity: 1024,
        }
    }
}

/// Heartbeat timing for the controller
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub heartbeat_secs: u64,
    /// Idle time after which the host evicts the controller
    pub eviction_threshold_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 25,
            eviction_threshold_secs: 30,
        }
    }
}

impl KeepAliveConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn eviction_threshold(&self) -> Duration {
        Duration::from_secs(self.eviction_threshold_secs)
    }

    /// Heartbeat must fire strictly before the host gives up on us
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_secs == 0 {
            anyhow::bail!("keepalive.heartbeat_secs must be greater than zero");
        }
        if self.heartbeat_secs >= self.eviction_threshold_secs {
            anyhow::bail!(
                "keepalive.heartbeat_secs ({}) must be shorter than eviction_threshold_secs ({})",
                self.heartbeat_secs,
                self.eviction_threshold_secs
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub handshake_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 10_000,
        }
    }
}

impl BridgeConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Capture quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    #[default]
    Medium,
    High,
}

/// Concrete capture parameters for a quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProfile {
    pub sample_rate: u32,
    pub bit_rate: u32,
    pub channels: u16,
}

impl AudioQuality {
    pub fn profile(self) -> AudioProfile {
        match self {
            Self::Low => AudioProfile {
                sample_rate: 8000,
                bit_rate: 64_000,
                channels: 1,
            },
            Self::Medium => AudioProfile {
                sample_rate: 16000,
                bit_rate: 128_000,
                channels: 1,
            },
            Self::High => AudioProfile {
                sample_rate: 44100,
                bit_rate: 256_000,
                channels: 2,
            },
        }
    }
}

impl Default for AudioProfile {
    fn default() -> Self {
        AudioQuality::default().profile()
    }
}

/// Where the capture worker pulls audio from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSourceKind {
    /// Generated sine tone
    Tone,
    /// Replay of a WAV file
    Wav,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub quality: AudioQuality,
    /// Minimum spacing between `AUDIO_DATA` messages
    pub send_interval_ms: u64,
    pub source: CaptureSourceKind,
    pub wav_path: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            quality: AudioQuality::Medium,
            send_interval_ms: 100,
            source: CaptureSourceKind::Tone,
            wav_path: None,
        }
    }
}

impl CaptureConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub enabled: bool,
    pub ws_url: String,
    pub base_url: String,
    pub api_version: String,
    pub source: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: "wss://ednoteai.com".to_string(),
            base_url: "https://ednoteai.com".to_string(),
            api_version: "v1".to_string(),
            source: "chrome_extension".to_string(),
        }
    }
}

impl TranscriptionConfig {
    pub fn stream_url(&self) -> String {
        format!(
            "{}/api/{}/transcribe/stream",
            self.ws_url.trim_end_matches('/'),
            self.api_version
        )
    }

    pub fn note_url(&self, note_id: &str) -> String {
        format!(
            "{}/dashboard/analysis/{}",
            self.base_url.trim_end_matches('/'),
            note_id
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file backing the key-value store; in-memory when unset
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data/store.json")),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TAB_RECORDER").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.keepalive.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keepalive_is_shorter_than_threshold() {
        let keepalive = KeepAliveConfig::default();
        assert!(keepalive.validate().is_ok());
        assert!(keepalive.heartbeat() < keepalive.eviction_threshold());
    }

    #[test]
    fn test_keepalive_rejects_period_at_threshold() {
        let keepalive = KeepAliveConfig {
            heartbeat_secs: 30,
            eviction_threshold_secs: 30,
        };
        assert!(keepalive.validate().is_err());
    }

    #[test]
    fn test_quality_presets() {
        assert_eq!(AudioQuality::Low.profile().sample_rate, 8000);
        assert_eq!(AudioQuality::Medium.profile(), AudioProfile::default());
        assert_eq!(AudioQuality::High.profile().channels, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cfg = Config::load("does/not/exist/tab-recorder").unwrap();
        assert_eq!(cfg.bridge.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.bus.backend, BusBackend::Memory);
        assert_eq!(cfg.service.http.port, 8765);
    }

    #[test]
    fn test_load_toml_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("recorder.toml");
        std::fs::write(
            &path,
            r#"
[bridge]
handshake_timeout_ms = 2500

[capture]
quality = "high"
source = "wav"
wav_path = "fixtures/lecture.wav"
"#,
        )?;

        let cfg = Config::load(path.to_str().unwrap())?;
        assert_eq!(cfg.bridge.handshake_timeout(), Duration::from_millis(2500));
        assert_eq!(cfg.capture.quality, AudioQuality::High);
        assert_eq!(cfg.capture.source, CaptureSourceKind::Wav);
        assert_eq!(cfg.keepalive.heartbeat_secs, 25);
        Ok(())
    }

    #[test]
    fn test_stream_url() {
        let cfg = TranscriptionConfig {
            ws_url: "ws://localhost:9000/".to_string(),
            ..TranscriptionConfig::default()
        };
        assert_eq!(cfg.stream_url(), "ws://localhost:9000/api/v1/transcribe/stream");
    }
}
