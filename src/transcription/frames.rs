//! Wire frames of the streaming transcription protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const START_TRANSCRIPTION: &str = "start_transcription";
pub const PCM_FORMAT: &str = "pcm_s16le";

/// Frames sent to the transcription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        token: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        action: String,
        source: String,
    },
    /// JSON header; `pcm` follows as a separate binary frame
    AudioChunk {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: i64,
        size: usize,
        format: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        channels: u16,
        #[serde(skip)]
        pcm: Vec<u8>,
    },
    EndSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl ClientFrame {
    pub fn auth(token: &str, session_id: &str, source: &str) -> Self {
        Self::Auth {
            token: token.to_string(),
            session_id: session_id.to_string(),
            action: START_TRANSCRIPTION.to_string(),
            source: source.to_string(),
        }
    }

    pub fn audio_chunk(session_id: &str, pcm: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self::AudioChunk {
            session_id: session_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            size: pcm.len(),
            format: PCM_FORMAT.to_string(),
            sample_rate,
            channels,
            pcm,
        }
    }

    pub fn end_session(session_id: &str) -> Self {
        Self::EndSession {
            session_id: session_id.to_string(),
        }
    }

    /// Binary payload that must follow the JSON header, if any
    pub fn binary(&self) -> Option<&[u8]> {
        match self {
            Self::AudioChunk { pcm, .. } => Some(pcm),
            _ => None,
        }
    }
}

/// Frames received from the transcription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    AuthSuccess,
    AuthFailed {
        #[serde(default)]
        message: Option<String>,
    },
    TranscriptPartial {
        text: String,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    TranscriptFinal {
        text: String,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    NotesGenerated {
        #[serde(default)]
        notes: Value,
        #[serde(rename = "noteId")]
        note_id: String,
    },
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
