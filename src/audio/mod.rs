pub mod backend;
pub mod convert;
pub mod file;
pub mod tone;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, BackendFactory,
};
pub use file::{AudioFile, WavBackend};
pub use tone::ToneBackend;
