//! Router-level tests: requests go through the full Axum stack via
//! `tower::ServiceExt::oneshot`, no listener needed.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use folio_core::{FolioConfig, ManualClock};
use folio_server::{build_router, AppState};
use folio_store::MemoryBackend;

fn app(dev_tools: bool) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = FolioConfig::from_vars(dir.path(), |key| match key {
        "FOLIO_DEV_TOOLS" if dev_tools => Some("1".into()),
        _ => None,
    })
    .unwrap();
    let state = AppState::new(
        config,
        Arc::new(MemoryBackend::new()),
        Arc::new(ManualClock::new(1_700_000_000_000)),
    );
    (build_router(Arc::new(state)), dir)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn eu_session(visitor: &str) -> Value {
    json!({
        "visitorId": visitor,
        "environment": {
            "timezone": "Europe/Vienna",
            "languages": ["de-AT", "en"],
            "dateFormat": "31.12.2024",
        },
    })
}

fn us_session(visitor: &str) -> Value {
    json!({
        "visitorId": visitor,
        "environment": {
            "timezone": "America/Denver",
            "languages": ["en-US"],
            "dateFormat": "12/31/2024",
        },
    })
}

#[tokio::test]
async fn test_us_visitor_is_auto_granted() {
    let (app, _dir) = app(false);
    let (status, body) = call(&app, "POST", "/api/consent/session", Some(us_session("v1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consent"]["state"], "AUTO_GRANTED");
    assert_eq!(body["consent"]["decision"]["reason"], "auto-non-restricted-region");
    assert_eq!(body["consent"]["promptPending"], false);
    assert_eq!(body["monitors"]["analytics"], true);
    assert_eq!(body["monitors"]["performance"], true);
}

#[tokio::test]
async fn test_eu_visitor_accepts() {
    let (app, _dir) = app(false);
    let (_, created) = call(&app, "POST", "/api/consent/session", Some(eu_session("v2"))).await;
    assert_eq!(created["consent"]["state"], "AWAITING_PROMPT");
    assert_eq!(created["monitors"]["analytics"], false);

    let id = created["sessionId"].as_str().unwrap().to_string();
    let (status, answered) = call(
        &app,
        "POST",
        &format!("/api/consent/session/{id}/accept"),
        Some(json!({ "reason": "banner-accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered["recorded"], true);
    assert_eq!(answered["consent"]["state"], "RESTORED_GRANTED");
    assert_eq!(answered["consent"]["decision"]["reason"], "user-accept");
    assert_eq!(answered["monitors"]["analytics"], true);

    // Double submit is a no-op.
    let (_, again) = call(&app, "POST", &format!("/api/consent/session/{id}/decline"), None).await;
    assert_eq!(again["recorded"], false);
    assert_eq!(again["consent"]["state"], "RESTORED_GRANTED");

    // The next page load reuses the stored decision.
    let (_, next) = call(&app, "POST", "/api/consent/session", Some(eu_session("v2"))).await;
    assert_eq!(next["consent"]["state"], "RESTORED_GRANTED");
}

#[tokio::test]
async fn test_decline_then_reload() {
    let (app, _dir) = app(false);
    let (_, created) = call(&app, "POST", "/api/consent/session", Some(eu_session("v3"))).await;
    let id = created["sessionId"].as_str().unwrap().to_string();

    let (_, answered) = call(&app, "POST", &format!("/api/consent/session/{id}/decline"), None).await;
    assert_eq!(answered["consent"]["state"], "RESTORED_DECLINED");
    assert_eq!(answered["consent"]["decision"]["granted"], false);
    assert_eq!(answered["monitors"]["performance"], false);

    let (_, next) = call(&app, "POST", "/api/consent/session", Some(us_session("v3"))).await;
    assert_eq!(next["consent"]["state"], "RESTORED_DECLINED");
}

#[tokio::test]
async fn test_details_toggle() {
    let (app, _dir) = app(false);
    let (_, created) = call(&app, "POST", "/api/consent/session", Some(eu_session("v4"))).await;
    let id = created["sessionId"].as_str().unwrap().to_string();

    let (_, open) = call(&app, "POST", &format!("/api/consent/session/{id}/details"), None).await;
    assert_eq!(open["detailsOpen"], true);
    let (_, closed) =
        call(&app, "POST", &format!("/api/consent/session/{id}/details/close"), None).await;
    assert_eq!(closed["detailsOpen"], false);

    let (_, session) = call(&app, "GET", &format!("/api/consent/session/{id}"), None).await;
    assert_eq!(session["consent"]["state"], "AWAITING_PROMPT");
}

#[tokio::test]
async fn test_unknown_session_and_bad_input() {
    let (app, _dir) = app(false);
    let (status, body) = call(&app, "GET", "/api/consent/session/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, "POST", "/api/consent/session/nope/accept", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/consent/session",
        Some(json!({ "visitorId": "bad:id" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ended_session_records_nothing() {
    let (app, _dir) = app(false);
    let (_, created) = call(&app, "POST", "/api/consent/session", Some(eu_session("v5"))).await;
    let id = created["sessionId"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "DELETE", &format!("/api/consent/session/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, next) = call(&app, "POST", "/api/consent/session", Some(eu_session("v5"))).await;
    assert_eq!(next["consent"]["state"], "AWAITING_PROMPT");
}

#[tokio::test]
async fn test_event_stream_replays_pending_banner() {
    let (app, _dir) = app(false);
    let (_, created) = call(&app, "POST", "/api/consent/session", Some(eu_session("v6"))).await;
    let id = created["sessionId"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/api/consent/session/{id}/events"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .expect("replayed frame")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.contains("\"type\":\"show-banner\""), "got {text}");
}

#[tokio::test]
async fn test_event_stream_skips_answered_banner() {
    let (app, _dir) = app(false);
    let (_, created) = call(&app, "POST", "/api/consent/session", Some(eu_session("v9"))).await;
    let id = created["sessionId"].as_str().unwrap().to_string();
    call(&app, "POST", &format!("/api/consent/session/{id}/accept"), None).await;

    let request = Request::builder()
        .uri(format!("/api/consent/session/{id}/events"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_millis(200), frames.next()).await;
    assert!(first.is_err(), "answered banner was replayed");
}

#[tokio::test]
async fn test_dev_routes_hidden_by_default() {
    let (app, _dir) = app(false);
    let (status, _) = call(
        &app,
        "POST",
        "/api/dev/consent/clear",
        Some(json!({ "visitorId": "v7" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dev_routes_seed_and_inspect() {
    let (app, _dir) = app(true);

    let (status, forced) = call(
        &app,
        "POST",
        "/api/dev/consent/region",
        Some(json!({ "visitorId": "v8", "restricted": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forced["isEU"], true);

    let (_, created) = call(&app, "POST", "/api/consent/session", Some(us_session("v8"))).await;
    assert_eq!(created["consent"]["state"], "AWAITING_PROMPT");

    let (_, status_body) = call(&app, "GET", "/api/dev/consent/status/v8", None).await;
    assert_eq!(status_body["classification"]["isEU"], true);
    assert_eq!(status_body["session"]["state"], "AWAITING_PROMPT");
    assert!(status_body["decision"].is_null());

    call(&app, "POST", "/api/dev/consent/clear", Some(json!({ "visitorId": "v8" }))).await;
    let (_, status_body) = call(&app, "GET", "/api/dev/consent/status/v8", None).await;
    assert!(status_body["classification"].is_null());
}
