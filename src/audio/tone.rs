// Synthetic capture source producing a continuous sine tone

use anyhow::{bail, Result};
use std::f32::consts::TAU;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

pub struct ToneBackend {
    config: AudioBackendConfig,
    frequency_hz: f32,
    task: Option<JoinHandle<()>>,
}

impl ToneBackend {
    pub fn new(config: AudioBackendConfig, frequency_hz: f32) -> Self {
        Self {
            config,
            frequency_hz,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for ToneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(32);
        let config = self.config.clone();
        let step = TAU * self.frequency_hz / config.sample_rate as f32;
        let channels = config.channels.max(1) as usize;
        let frames_per_buffer = config.samples_per_buffer() / channels;

        self.task = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(config.buffer_duration_ms.max(1)));
            let mut phase = 0.0f32;
            let mut timestamp_ms = 0u64;

            loop {
                ticker.tick().await;

                let mut samples = Vec::with_capacity(frames_per_buffer * channels);
                for _ in 0..frames_per_buffer {
                    let value = (phase.sin() * i16::MAX as f32 * 0.25) as i16;
                    samples.extend(std::iter::repeat(value).take(channels));
                    phase = (phase + step) % TAU;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += config.buffer_duration_ms;
            }
        }));

        info!(
            "Tone capture started ({}Hz tone, {}Hz, {} channels)",
            self.frequency_hz, self.config.sample_rate, self.config.channels
        );

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Tone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "tone"
    }
}

impl Drop for ToneBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
