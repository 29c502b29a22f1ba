//! Recording session state
//!
//! This module provides the `SessionRegistry`, the only place session state
//! lives:
//! - At most one session per tab
//! - Sessions appear on `begin` and disappear on `end`
//! - Transcript text is replaced, never concatenated
//! - Audio chunks arriving after `end` are dropped

mod registry;
mod session;
mod stats;

pub use registry::SessionRegistry;
pub use session::{RecordingSession, SessionStatus};
pub use stats::{EndOutcome, SessionSummary};
