use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capture::CaptureWorker;
use crate::audio::BackendFactory;
use crate::bridge::RequestBridge;
use crate::bus::{Channel, Envelope, MessageBus};
use crate::config::AudioProfile;
use crate::error::{RecorderError, Remedy};
use crate::protocol::{self, CaptureReply, StartCapture};

/// Stable id of the pooled capture worker context
pub const WORKER_TARGET: &str = "capture-worker";

/// Reason code handed to the host when a worker is created
pub const USER_MEDIA: &str = "USER_MEDIA";
pub const JUSTIFICATION: &str = "tab audio capture for live transcription";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Absent,
    Creating,
    Ready,
}

/// Platform facility that owns worker contexts
///
/// Hosts allow a single context per target; creating a second one while
/// the first is alive fails.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    async fn has_context(&self, target: &str) -> bool;

    async fn create_context(&self, target: &str, reason: &str, justification: &str) -> Result<()>;
}

/// Obtains the opaque stream handle for a tab's audio
#[async_trait]
pub trait StreamNegotiator: Send + Sync {
    async fn negotiate(&self, tab_id: &str) -> Result<String>;
}

/// Issues fresh `stream-<uuid>` handles without talking to anyone
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticNegotiator;

#[async_trait]
impl StreamNegotiator for SyntheticNegotiator {
    async fn negotiate(&self, tab_id: &str) -> Result<String> {
        let stream_id = format!("stream-{}", Uuid::new_v4());
        debug!("Negotiated {} for tab {}", stream_id, tab_id);
        Ok(stream_id)
    }
}

/// Runs capture workers as tokio tasks sharing the controller's bus
pub struct InProcessWorkerHost {
    bus: Arc<dyn MessageBus>,
    factory: Arc<dyn BackendFactory>,
    send_interval: Duration,
    contexts: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl InProcessWorkerHost {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        factory: Arc<dyn BackendFactory>,
        send_interval: Duration,
    ) -> Self {
        Self {
            bus,
            factory,
            send_interval,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Kill a context, as the platform does when it reclaims one
    pub fn close_context(&self, target: &str) -> bool {
        match self.contexts.lock().remove(target) {
            Some(handle) => {
                handle.abort();
                info!("Closed worker context {}", target);
                true
            }
            None => false,
        }
    }

    fn is_alive(&self, target: &str) -> bool {
        self.contexts
            .lock()
            .get(target)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait]
impl WorkerHost for InProcessWorkerHost {
    async fn has_context(&self, target: &str) -> bool {
        self.is_alive(target)
    }

    async fn create_context(&self, target: &str, reason: &str, justification: &str) -> Result<()> {
        if self.is_alive(target) {
            anyhow::bail!("Only a single {} context may exist", target);
        }

        info!("Creating {} context ({}: {})", target, reason, justification);
        let worker = CaptureWorker::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.factory),
            self.send_interval,
        );
        let commands = self.bus.subscribe(Channel::Runtime).await?;

        let mut contexts = self.contexts.lock();
        if contexts.get(target).map(|h| !h.is_finished()).unwrap_or(false) {
            anyhow::bail!("Only a single {} context may exist", target);
        }
        contexts.insert(target.to_string(), tokio::spawn(worker.run(commands)));
        Ok(())
    }
}

impl Drop for InProcessWorkerHost {
    fn drop(&mut self) {
        for (_, handle) in self.contexts.lock().drain() {
            handle.abort();
        }
    }
}

/// Keeps one capture worker alive and routes capture commands to it
pub struct CaptureWorkerSupervisor {
    host: Arc<dyn WorkerHost>,
    bridge: Arc<RequestBridge>,
    state: Mutex<WorkerState>,
}

impl CaptureWorkerSupervisor {
    pub fn new(host: Arc<dyn WorkerHost>, bridge: Arc<RequestBridge>) -> Self {
        Self {
            host,
            bridge,
            state: Mutex::new(WorkerState::Absent),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Make sure the capture worker exists, creating it when absent
    pub async fn ensure_ready(&self) -> Result<(), RecorderError> {
        if self.host.has_context(WORKER_TARGET).await {
            *self.state.lock() = WorkerState::Ready;
            return Ok(());
        }

        *self.state.lock() = WorkerState::Creating;
        match self
            .host
            .create_context(WORKER_TARGET, USER_MEDIA, JUSTIFICATION)
            .await
        {
            Ok(()) => {
                *self.state.lock() = WorkerState::Ready;
                info!("Capture worker ready");
                Ok(())
            }
            // Lost a creation race; the other caller's worker serves us too
            Err(_) if self.host.has_context(WORKER_TARGET).await => {
                *self.state.lock() = WorkerState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = WorkerState::Absent;
                warn!("Failed to create capture worker: {:#}", e);
                Err(RecorderError::capture_setup(format!("{:#}", e), Remedy::Reload))
            }
        }
    }

    /// Run the `start-recording` handshake with the worker
    pub async fn start(
        &self,
        tab_id: &str,
        stream_id: &str,
        profile: AudioProfile,
    ) -> Result<(), RecorderError> {
        let command = StartCapture {
            stream_id: stream_id.to_string(),
            audio_config: profile,
        };
        let request = Envelope::with_payload(protocol::WORKER_START, tab_id, &command)
            .map_err(|e| RecorderError::capture_setup(format!("{:#}", e), Remedy::None))?;

        let response = self
            .bridge
            .send(request, protocol::WORKER_START_RESPONSE)
            .await?;

        let reply: CaptureReply = response.decode().map_err(|e| {
            RecorderError::capture_setup(format!("Malformed worker reply: {:#}", e), Remedy::Reload)
        })?;

        if reply.success {
            Ok(())
        } else {
            Err(RecorderError::capture_setup(
                reply
                    .error
                    .unwrap_or_else(|| "Capture worker refused to start".to_string()),
                reply.remedy,
            ))
        }
    }

    /// Tell the worker to stop capturing `tab_id`; no reply is awaited
    pub async fn stop(&self, tab_id: &str) {
        let command = Envelope::new(protocol::WORKER_STOP, tab_id);
        if let Err(e) = self.bridge.bus().publish(Channel::Runtime, command).await {
            debug!("stop-recording for tab {} not delivered: {}", tab_id, e);
        }
    }
}
