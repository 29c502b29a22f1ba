//! Wiring of the controller, capture worker host and observer surface

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::audio::{AudioBackendConfig, AudioBackendFactory, AudioSource, BackendFactory};
use crate::bridge::RequestBridge;
use crate::bus::{LocalBus, MessageBus, NatsBus};
use crate::config::{BusBackend, BusConfig, Config, StoreConfig};
use crate::controller::{Controller, ControllerDeps};
use crate::keepalive::KeepAliveScheduler;
use crate::observer::ObserverClient;
use crate::session::SessionRegistry;
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use crate::transcription::{TranscriptionService, WsTranscriptionService};
use crate::worker::{CaptureWorkerSupervisor, InProcessWorkerHost, SyntheticNegotiator};

pub async fn connect_bus(config: &BusConfig) -> Result<Arc<dyn MessageBus>> {
    match config.backend {
        BusBackend::Memory => Ok(Arc::new(LocalBus::new(config.capacity))),
        BusBackend::Nats => {
            let bus = NatsBus::connect(&config.nats_url, config.subject_prefix.clone())
                .await
                .with_context(|| format!("Failed to connect to NATS at {}", config.nats_url))?;
            Ok(Arc::new(bus))
        }
    }
}

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    match &config.path {
        Some(path) => Ok(Arc::new(FileStore::open(path.clone()).await?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Every context of a single-process deployment
pub struct Runtime {
    pub controller: Controller,
    pub observer: Arc<ObserverClient>,
    pub worker_host: Arc<InProcessWorkerHost>,
    pub keepalive: Arc<KeepAliveScheduler>,
}

impl Runtime {
    pub async fn start(
        config: &Config,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let timeout = config.bridge.handshake_timeout();

        let source = AudioSource::from_config(&config.capture)?;
        let factory: Arc<dyn BackendFactory> =
            Arc::new(AudioBackendFactory::new(source, AudioBackendConfig::default()));
        let worker_host = Arc::new(InProcessWorkerHost::new(
            Arc::clone(&bus),
            factory,
            config.capture.send_interval(),
        ));

        let bridge = Arc::new(RequestBridge::attach(Arc::clone(&bus), timeout).await?);
        let supervisor = Arc::new(CaptureWorkerSupervisor::new(
            worker_host.clone(),
            Arc::clone(&bridge),
        ));
        let keepalive = Arc::new(KeepAliveScheduler::new(
            Arc::clone(&store),
            &config.keepalive,
        )?);

        let transcription: Option<Arc<dyn TranscriptionService>> =
            if config.transcription.enabled {
                Some(Arc::new(WsTranscriptionService::new(&config.transcription)))
            } else {
                None
            };

        let controller = Controller::spawn(ControllerDeps {
            bus: Arc::clone(&bus),
            registry: Arc::new(SessionRegistry::new()),
            bridge,
            supervisor,
            negotiator: Arc::new(SyntheticNegotiator),
            store,
            keepalive: Arc::clone(&keepalive),
            transcription,
            transcription_config: config.transcription.clone(),
            profile: config.capture.quality.profile(),
        })
        .await?;

        let observer = Arc::new(ObserverClient::connect(bus, timeout).await?);

        info!(
            "Runtime ready (capture {:?}, transcription {})",
            config.capture.quality,
            if config.transcription.enabled { "on" } else { "off" }
        );

        Ok(Self {
            controller,
            observer,
            worker_host,
            keepalive,
        })
    }
}
