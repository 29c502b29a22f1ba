//! Error taxonomy shared by every context.
//!
//! Each error carries a [`Remedy`] that observers use to pick a follow-up
//! action for the user. The remedy is fixed when the error is built and
//! travels with it across the bus inside an [`ErrorReport`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Follow-up action suggested to the user alongside an error notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Remedy {
    #[default]
    None,
    /// Reload the page or extension so a fresh context is created
    Reload,
    /// Grant capture permissions for the tab
    CheckPermissions,
    /// Sign in again to obtain a credential
    SignIn,
    /// Try the same action again later
    Retry,
}

/// Wire form of an error, relayed between contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(default)]
    pub remedy: Remedy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("Recording already active for tab {tab_id}")]
    AlreadyRecording { tab_id: String },

    #[error("No active recording session for tab {tab_id}")]
    NoActiveSession { tab_id: String },

    #[error("Capture setup failed: {cause}")]
    CaptureSetup { cause: String, remedy: Remedy },

    #[error("{operation} for tab {tab_id} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: String,
        tab_id: String,
        timeout: Duration,
    },

    #[error("Execution context is no longer available")]
    ContextUnavailable,

    #[error("A {operation} request for tab {tab_id} is already in flight")]
    HandshakeInFlight { operation: String, tab_id: String },

    #[error("Start handshake for tab {tab_id} was superseded by a stop request")]
    Superseded { tab_id: String },

    #[error("Authentication required. Please sign in first.")]
    AuthRequired,

    #[error("Credential store failed: {cause}")]
    Storage { cause: String },

    #[error("Malformed {kind} request: {cause}")]
    MalformedRequest { kind: String, cause: String },

    #[error("{}", .0.message)]
    Rejected(ErrorReport),
}

impl RecorderError {
    /// Capture setup failure with an explicit remedy
    pub fn capture_setup(cause: impl Into<String>, remedy: Remedy) -> Self {
        Self::CaptureSetup {
            cause: cause.into(),
            remedy,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &str {
        match self {
            Self::AlreadyRecording { .. } => "already_recording",
            Self::NoActiveSession { .. } => "no_active_session",
            Self::CaptureSetup { .. } => "capture_setup",
            Self::Timeout { .. } => "timeout",
            Self::ContextUnavailable => "context_unavailable",
            Self::HandshakeInFlight { .. } => "handshake_in_flight",
            Self::Superseded { .. } => "superseded",
            Self::AuthRequired => "auth_required",
            Self::Storage { .. } => "storage",
            Self::MalformedRequest { .. } => "malformed_request",
            Self::Rejected(report) => &report.code,
        }
    }

    pub fn remedy(&self) -> Remedy {
        match self {
            Self::CaptureSetup { remedy, .. } => *remedy,
            Self::Timeout { .. } | Self::HandshakeInFlight { .. } | Self::Storage { .. } => {
                Remedy::Retry
            }
            Self::ContextUnavailable => Remedy::Reload,
            Self::AuthRequired => Remedy::SignIn,
            Self::Rejected(report) => report.remedy,
            Self::AlreadyRecording { .. }
            | Self::NoActiveSession { .. }
            | Self::Superseded { .. }
            | Self::MalformedRequest { .. } => Remedy::None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        match self {
            Self::Rejected(report) => report.clone(),
            other => ErrorReport {
                code: other.code().to_string(),
                message: other.to_string(),
                remedy: other.remedy(),
            },
        }
    }
}

impl From<ErrorReport> for RecorderError {
    fn from(report: ErrorReport) -> Self {
        Self::Rejected(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_setup_keeps_constructed_remedy() {
        let err = RecorderError::capture_setup("permission denied", Remedy::CheckPermissions);
        assert_eq!(err.remedy(), Remedy::CheckPermissions);
        assert_eq!(err.code(), "capture_setup");
        assert_eq!(err.to_string(), "Capture setup failed: permission denied");
    }

    #[test]
    fn test_rejected_report_round_trips_remedy() {
        let original = RecorderError::AuthRequired;
        let relayed = RecorderError::from(original.report());

        assert_eq!(relayed.code(), "auth_required");
        assert_eq!(relayed.remedy(), Remedy::SignIn);
        assert_eq!(relayed.to_string(), original.to_string());
    }

    #[test]
    fn test_report_serializes_remedy_kebab_case() {
        let report = RecorderError::ContextUnavailable.report();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["remedy"], "reload");
        assert_eq!(json["code"], "context_unavailable");
        assert!(json["error"].as_str().unwrap().contains("no longer available"));
    }

    #[test]
    fn test_timeout_message_includes_interval() {
        let err = RecorderError::Timeout {
            operation: "start-recording".to_string(),
            tab_id: "tab-9".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "start-recording for tab tab-9 timed out after 10000ms");
        assert_eq!(err.remedy(), Remedy::Retry);
    }
}
