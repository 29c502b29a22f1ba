//! HTTP observer surface
//!
//! - POST /tabs/:tab_id/record/start - Start recording a tab
//! - POST /tabs/:tab_id/record/stop - Stop recording a tab
//! - GET /tabs/:tab_id/status - Query the controller for the tab's session
//! - GET /tabs/:tab_id/events - Server-sent event stream for the tab
//! - PUT /auth/token, GET /auth/status - Credentials
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{status_for, ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
