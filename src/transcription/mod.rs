pub mod client;
pub mod frames;

pub use client::{TranscriptionLink, TranscriptionService, WsTranscriptionService};
pub use frames::{ClientFrame, ServerFrame};
