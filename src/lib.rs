pub mod app;
pub mod audio;
pub mod bridge;
pub mod broadcast;
pub mod bus;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod keepalive;
pub mod observer;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transcription;
pub mod worker;

pub use app::Runtime;
pub use audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use bridge::RequestBridge;
pub use broadcast::EventBroadcaster;
pub use bus::{Channel, Envelope, LocalBus, MessageBus, NatsBus};
pub use config::{AudioProfile, AudioQuality, Config};
pub use controller::{Controller, ControllerDeps};
pub use error::{ErrorReport, RecorderError, Remedy};
pub use http::{create_router, AppState};
pub use keepalive::KeepAliveScheduler;
pub use observer::{Notice, ObserverClient};
pub use session::{EndOutcome, RecordingSession, SessionRegistry, SessionStatus, SessionSummary};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use worker::{CaptureWorkerSupervisor, InProcessWorkerHost, WorkerHost, WorkerState};
