use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/tabs/:tab_id/record/start", post(handlers::start_recording))
        .route("/tabs/:tab_id/record/stop", post(handlers::stop_recording))
        // Tab queries
        .route("/tabs/:tab_id/status", get(handlers::get_tab_status))
        .route("/tabs/:tab_id/events", get(handlers::tab_events))
        // Credentials
        .route("/auth/token", put(handlers::set_auth_token))
        .route("/auth/status", get(handlers::get_auth_status))
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
