use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::convert::{encode_pcm, process_frame};
use crate::audio::{AudioBackend, AudioFrame, BackendFactory};
use crate::bus::{Channel, Envelope, MessageBus, Subscription};
use crate::config::AudioProfile;
use crate::error::Remedy;
use crate::protocol::{self, AudioData, CaptureReply, StartCapture};

struct ActiveCapture {
    backend: Box<dyn AudioBackend>,
    pump: JoinHandle<()>,
}

/// The capture worker context
///
/// Owns every running capture, one per tab, and streams converted audio
/// back to the controller as `AUDIO_DATA`. Commands are handled one at a
/// time in arrival order.
pub struct CaptureWorker {
    bus: Arc<dyn MessageBus>,
    factory: Arc<dyn BackendFactory>,
    send_interval: Duration,
    captures: HashMap<String, ActiveCapture>,
}

impl CaptureWorker {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        factory: Arc<dyn BackendFactory>,
        send_interval: Duration,
    ) -> Self {
        Self {
            bus,
            factory,
            send_interval,
            captures: HashMap::new(),
        }
    }

    /// Serve commands until the subscription ends
    ///
    /// Subscribe before spawning this so no command is missed.
    pub async fn run(mut self, mut commands: Subscription) {
        info!("Capture worker running");

        while let Some(envelope) = commands.next().await {
            match envelope.kind.as_str() {
                protocol::WORKER_START => self.handle_start(envelope).await,
                protocol::WORKER_STOP => self.stop_capture(&envelope.tab_id).await,
                _ => {}
            }
        }

        for tab_id in self.captures.keys().cloned().collect::<Vec<_>>() {
            self.stop_capture(&tab_id).await;
        }
        info!("Capture worker exiting");
    }

    async fn handle_start(&mut self, envelope: Envelope) {
        let tab_id = envelope.tab_id.clone();
        let reply = match envelope.decode::<StartCapture>() {
            Ok(command) => self.start_capture(&tab_id, command).await,
            Err(e) => CaptureReply::failed(format!("{:#}", e), Remedy::None),
        };
        self.reply(&tab_id, reply).await;
    }

    async fn start_capture(&mut self, tab_id: &str, command: StartCapture) -> CaptureReply {
        info!("Starting tab capture for {} (stream={})", tab_id, command.stream_id);

        if self.captures.contains_key(tab_id) {
            info!("Tab {} already has an active capture, stopping it first", tab_id);
            self.stop_capture(tab_id).await;
        }

        let mut backend = match self.factory.open(&command.stream_id) {
            Ok(backend) => backend,
            Err(e) => {
                error!("Failed to open capture for tab {}: {:#}", tab_id, e);
                return CaptureReply::failed(format!("{:#}", e), Remedy::CheckPermissions);
            }
        };

        let frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Failed to start {} capture for tab {}: {:#}", backend.name(), tab_id, e);
                return CaptureReply::failed(format!("{:#}", e), Remedy::CheckPermissions);
            }
        };

        let pump = tokio::spawn(pump_audio(
            Arc::clone(&self.bus),
            tab_id.to_string(),
            frames,
            command.audio_config,
            self.send_interval,
        ));

        info!("Tab capture started for {} via {}", tab_id, backend.name());
        self.captures
            .insert(tab_id.to_string(), ActiveCapture { backend, pump });

        CaptureReply::ok()
    }

    async fn stop_capture(&mut self, tab_id: &str) {
        let Some(mut capture) = self.captures.remove(tab_id) else {
            debug!("No capture to stop for tab {}", tab_id);
            return;
        };

        if let Err(e) = capture.backend.stop().await {
            warn!("Failed to stop capture backend for tab {}: {:#}", tab_id, e);
        }
        capture.pump.abort();

        info!("Tab capture stopped for {}", tab_id);
    }

    async fn reply(&self, tab_id: &str, reply: CaptureReply) {
        let envelope = match Envelope::with_payload(protocol::WORKER_START_RESPONSE, tab_id, &reply) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to encode capture reply: {:#}", e);
                return;
            }
        };
        if let Err(e) = self.bus.publish(Channel::Runtime, envelope).await {
            warn!("Capture reply for tab {} not delivered: {}", tab_id, e);
        }
    }
}

/// Convert frames and publish them, at most once per `send_interval`
///
/// Frames arriving inside the interval are buffered rather than dropped.
async fn pump_audio(
    bus: Arc<dyn MessageBus>,
    tab_id: String,
    mut frames: mpsc::Receiver<AudioFrame>,
    profile: AudioProfile,
    send_interval: Duration,
) {
    let mut pending: Vec<i16> = Vec::new();
    let mut last_sent: Option<Instant> = None;
    let mut sequence = 0u64;

    while let Some(frame) = frames.recv().await {
        let converted = process_frame(frame, profile.sample_rate, profile.channels);
        pending.extend_from_slice(&converted.samples);

        let due = last_sent
            .map(|sent| sent.elapsed() >= send_interval)
            .unwrap_or(true);
        if !due || pending.is_empty() {
            continue;
        }

        publish_chunk(&*bus, &tab_id, &pending, profile, sequence).await;
        pending.clear();
        last_sent = Some(Instant::now());
        sequence += 1;
    }

    if !pending.is_empty() {
        publish_chunk(&*bus, &tab_id, &pending, profile, sequence).await;
    }
    debug!("Audio pump for tab {} finished", tab_id);
}

async fn publish_chunk(
    bus: &dyn MessageBus,
    tab_id: &str,
    samples: &[i16],
    profile: AudioProfile,
    sequence: u64,
) {
    let data = AudioData {
        audio_data: encode_pcm(samples),
        sample_rate: profile.sample_rate,
        channels: profile.channels,
        sequence,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };

    let envelope = match Envelope::with_payload(protocol::AUDIO_DATA, tab_id, &data) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Failed to encode audio chunk: {:#}", e);
            return;
        }
    };

    // The controller might not be listening, that's ok
    if let Err(e) = bus.publish(Channel::Runtime, envelope).await {
        debug!("Audio chunk {} for tab {} not delivered: {}", sequence, tab_id, e);
    }
}
