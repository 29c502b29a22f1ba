// Shared fixtures for the end-to-end tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tab_recorder::audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource, BackendFactory};
use tab_recorder::bus::Subscription;
use tab_recorder::config::{AudioQuality, KeepAliveConfig, TranscriptionConfig};
use tab_recorder::store::AUTH_TOKEN_KEY;
use tab_recorder::transcription::{ClientFrame, ServerFrame, TranscriptionLink, TranscriptionService};
use tab_recorder::worker::{SyntheticNegotiator, WorkerHost};
use tab_recorder::{
    CaptureWorkerSupervisor, Controller, ControllerDeps, Envelope, InProcessWorkerHost,
    KeepAliveScheduler, KeyValueStore, LocalBus, MemoryStore, MessageBus, ObserverClient,
    RequestBridge, SessionRegistry,
};
use tokio::sync::mpsc;

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Transcription service whose links the test drives by hand
#[derive(Default)]
pub struct FakeTranscription {
    links: Mutex<HashMap<String, (mpsc::Receiver<ClientFrame>, mpsc::Sender<ServerFrame>)>>,
}

impl FakeTranscription {
    /// Wait until the controller opened a link for `session_id`
    pub async fn take_link(
        &self,
        session_id: &str,
    ) -> Option<(mpsc::Receiver<ClientFrame>, mpsc::Sender<ServerFrame>)> {
        for _ in 0..200 {
            if let Some(link) = self.links.lock().remove(session_id) {
                return Some(link);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

#[async_trait]
impl TranscriptionService for FakeTranscription {
    async fn open(&self, session_id: &str, _token: &str) -> Result<TranscriptionLink> {
        let (link, outbound, inbound) = TranscriptionLink::pair();
        self.links
            .lock()
            .insert(session_id.to_string(), (outbound, inbound));
        Ok(link)
    }
}

/// Factory that refuses every stream, like a tab that cannot be captured
pub struct RefusingFactory;

impl BackendFactory for RefusingFactory {
    fn open(&self, _stream_id: &str) -> Result<Box<dyn AudioBackend>> {
        anyhow::bail!("Cannot capture a browser internal page")
    }
}

pub fn tone_factory() -> Arc<dyn BackendFactory> {
    Arc::new(AudioBackendFactory::new(
        AudioSource::Tone { frequency_hz: 440.0 },
        AudioBackendConfig::default(),
    ))
}

pub struct Harness {
    pub bus: Arc<dyn MessageBus>,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<SessionRegistry>,
    pub host: Arc<InProcessWorkerHost>,
    pub transcription: Arc<FakeTranscription>,
    pub controller: Controller,
    pub observer: ObserverClient,
}

/// In-process host whose worker takes a while to come up
pub struct SlowHost {
    inner: Arc<InProcessWorkerHost>,
    delay: Duration,
}

#[async_trait]
impl WorkerHost for SlowHost {
    async fn has_context(&self, target: &str) -> bool {
        self.inner.has_context(target).await
    }

    async fn create_context(&self, target: &str, reason: &str, justification: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_context(target, reason, justification).await
    }
}

pub struct HarnessBuilder {
    authenticated: bool,
    factory: Arc<dyn BackendFactory>,
    host: Option<Arc<dyn WorkerHost>>,
    create_delay: Option<Duration>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            authenticated: true,
            factory: tone_factory(),
            host: None,
            create_delay: None,
        }
    }

    pub fn signed_out(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Replace the in-process worker host, e.g. with a test-driven worker
    pub fn host(mut self, host: Arc<dyn WorkerHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Keep the real worker but delay its creation
    pub fn create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub async fn build(self) -> Result<Harness> {
        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new(256));
        let store = Arc::new(MemoryStore::new());
        if self.authenticated {
            store.set(AUTH_TOKEN_KEY, "test-token").await?;
        }

        let host = Arc::new(InProcessWorkerHost::new(
            Arc::clone(&bus),
            self.factory,
            Duration::from_millis(100),
        ));
        let worker_host: Arc<dyn WorkerHost> = match (self.host, self.create_delay) {
            (Some(custom), _) => custom,
            (None, Some(delay)) => Arc::new(SlowHost {
                inner: host.clone(),
                delay,
            }),
            (None, None) => host.clone(),
        };

        let bridge = Arc::new(RequestBridge::attach(Arc::clone(&bus), TIMEOUT).await?);
        let supervisor = Arc::new(CaptureWorkerSupervisor::new(worker_host, Arc::clone(&bridge)));
        let registry = Arc::new(SessionRegistry::new());
        let transcription = Arc::new(FakeTranscription::default());
        let keepalive = Arc::new(KeepAliveScheduler::new(
            store.clone(),
            &KeepAliveConfig::default(),
        )?);

        let controller = Controller::spawn(ControllerDeps {
            bus: Arc::clone(&bus),
            registry: Arc::clone(&registry),
            bridge,
            supervisor,
            negotiator: Arc::new(SyntheticNegotiator),
            store: store.clone(),
            keepalive,
            transcription: Some(transcription.clone()),
            transcription_config: TranscriptionConfig::default(),
            profile: AudioQuality::Medium.profile(),
        })
        .await?;

        let observer = ObserverClient::connect(Arc::clone(&bus), TIMEOUT).await?;

        Ok(Harness {
            bus,
            store,
            registry,
            host,
            transcription,
            controller,
            observer,
        })
    }
}

/// Next envelope of type `kind`, skipping everything else
pub async fn next_of(events: &mut Subscription, kind: &str) -> Option<Envelope> {
    tokio::time::timeout(TIMEOUT, async {
        while let Some(envelope) = events.next().await {
            if envelope.kind == kind {
                return Some(envelope);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
