use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::config::{CaptureConfig, CaptureSourceKind};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Native sample rate the backend produces
    pub sample_rate: u32,
    /// Native channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000, // Typical tab audio rate
            channels: 2,        // Stereo
            buffer_duration_ms: 100,
        }
    }
}

impl AudioBackendConfig {
    pub fn samples_per_buffer(&self) -> usize {
        (self.sample_rate as u64 * self.buffer_duration_ms / 1000) as usize * self.channels as usize
    }
}

/// Audio capture backend driven by the capture worker
///
/// Implementations:
/// - Tone: generated sine wave (development, tests)
/// - Wav: replay of a WAV file at real-time pace
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Generated tone at the given frequency
    Tone { frequency_hz: f32 },
    /// WAV file replay
    Wav(PathBuf),
}

impl AudioSource {
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        match config.source {
            CaptureSourceKind::Tone => Ok(Self::Tone {
                frequency_hz: 440.0,
            }),
            CaptureSourceKind::Wav => match &config.wav_path {
                Some(path) => Ok(Self::Wav(path.clone())),
                None => anyhow::bail!("capture.wav_path is required when capture.source = \"wav\""),
            },
        }
    }
}

/// Opens a backend for a negotiated stream
pub trait BackendFactory: Send + Sync {
    fn open(&self, stream_id: &str) -> Result<Box<dyn AudioBackend>>;
}

/// Audio backend factory
pub struct AudioBackendFactory {
    source: AudioSource,
    config: AudioBackendConfig,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, config: AudioBackendConfig) -> Self {
        Self { source, config }
    }

    /// Create audio backend for the configured source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Tone { frequency_hz } => {
                Ok(Box::new(super::tone::ToneBackend::new(config, frequency_hz)))
            }
            AudioSource::Wav(path) => Ok(Box::new(super::file::WavBackend::open(path, config)?)),
        }
    }
}

impl BackendFactory for AudioBackendFactory {
    fn open(&self, stream_id: &str) -> Result<Box<dyn AudioBackend>> {
        tracing::debug!("Opening {:?} backend for stream {}", self.source, stream_id);
        Self::create(self.source.clone(), self.config.clone())
    }
}
