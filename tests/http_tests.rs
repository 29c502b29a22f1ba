// HTTP surface driven through the router without binding a socket

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tab_recorder::config::Config;
use tab_recorder::{create_router, AppState, LocalBus, MemoryStore, Runtime};
use tower::ServiceExt;

async fn router() -> Result<(Router, Runtime)> {
    let mut config = Config::default();
    config.transcription.enabled = false;
    config.store.path = None;

    let runtime = Runtime::start(
        &config,
        Arc::new(LocalBus::new(256)),
        Arc::new(MemoryStore::new()),
    )
    .await?;
    let state = AppState::new(Arc::clone(&runtime.observer), "tab-recorder-test");

    Ok((create_router(state), runtime))
}

async fn call(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn post(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().method("POST").uri(uri).body(Body::empty())?)
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (app, _runtime) = router().await?;

    let (status, body) = call(&app, get("/health")?).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "tab-recorder-test");

    Ok(())
}

#[tokio::test]
async fn test_start_without_token_is_unauthorized() -> Result<()> {
    let (app, runtime) = router().await?;

    let (status, body) = call(&app, post("/tabs/42/record/start")?).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "auth_required");
    assert_eq!(body["remedy"], "sign-in");
    assert!(runtime.controller.registry().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_idle_tab_reports_nothing() -> Result<()> {
    let (app, _runtime) = router().await?;

    let (status, body) = call(&app, get("/tabs/42/status")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isRecording"], false);
    assert!(body["session"].is_null());

    let (status, body) = call(&app, post("/tabs/42/record/stop")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["noActiveSession"], true);

    Ok(())
}

#[tokio::test]
async fn test_token_update_changes_auth_status() -> Result<()> {
    let (app, _runtime) = router().await?;

    let (_, before) = call(&app, get("/auth/status")?).await?;
    assert_eq!(before["authenticated"], false);

    let request = Request::builder()
        .method("PUT")
        .uri("/auth/token")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"token":"abc","user":{"name":"Ada"}}"#))?;
    let (status, ack) = call(&app, request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);

    let (_, after) = call(&app, get("/auth/status")?).await?;
    assert_eq!(after["authenticated"], true);

    Ok(())
}
