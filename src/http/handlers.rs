use super::state::AppState;
use crate::error::{RecorderError, Remedy};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SetTokenRequest {
    /// Omit or send null to sign out
    pub token: Option<String>,
    pub user: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub remedy: Remedy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}

/// Typed error rendered as `{error, code, remedy}`
pub struct ApiError(pub RecorderError);

impl From<RecorderError> for ApiError {
    fn from(err: RecorderError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let report = self.0.report();
        (
            status,
            Json(ErrorResponse {
                error: report.message,
                code: report.code,
                remedy: report.remedy,
            }),
        )
            .into_response()
    }
}

/// HTTP status for an error, decided by its stable code
pub fn status_for(err: &RecorderError) -> StatusCode {
    match err.code() {
        "already_recording" | "handshake_in_flight" | "superseded" => StatusCode::CONFLICT,
        "no_active_session" => StatusCode::NOT_FOUND,
        "auth_required" => StatusCode::UNAUTHORIZED,
        "malformed_request" => StatusCode::BAD_REQUEST,
        "capture_setup" => StatusCode::UNPROCESSABLE_ENTITY,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        "context_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /tabs/:tab_id/record/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path(tab_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Start requested for tab {}", tab_id);
    let accepted = state.observer.start(&tab_id).await?;
    Ok((StatusCode::OK, Json(accepted)))
}

/// POST /tabs/:tab_id/record/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(tab_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Stop requested for tab {}", tab_id);
    let stopped = state.observer.stop(&tab_id).await?;
    Ok((StatusCode::OK, Json(stopped)))
}

/// GET /tabs/:tab_id/status
pub async fn get_tab_status(
    State(state): State<AppState>,
    Path(tab_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.observer.status(&tab_id).await?;
    Ok(Json(status))
}

/// GET /tabs/:tab_id/events
/// Server-sent stream of the tab's events, one SSE event per envelope
pub async fn tab_events(
    State(state): State<AppState>,
    Path(tab_id): Path<String>,
) -> Response {
    let events = match state.observer.events(&tab_id).await {
        Ok(events) => events,
        Err(e) => {
            warn!("Cannot subscribe to tab {}: {}", tab_id, e);
            return ApiError(RecorderError::ContextUnavailable).into_response();
        }
    };

    let stream = events.map(|envelope| {
        Event::default()
            .event(envelope.kind.clone())
            .json_data(&envelope)
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// PUT /auth/token
pub async fn set_auth_token(
    State(state): State<AppState>,
    Json(req): Json<SetTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ack = state.observer.set_auth_token(req.token, req.user).await?;
    Ok(Json(ack))
}

/// GET /auth/status
pub async fn get_auth_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = state.observer.auth_status().await?;
    Ok(Json(status))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            service: state.service_name.clone(),
        }),
    )
}
