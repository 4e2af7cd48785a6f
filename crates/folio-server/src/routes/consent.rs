//! Consent session routes: start a session, stream UI events, answer the
//! banner.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::{error, ApiError};
use crate::state::{valid_visitor_id, AppState, SessionHandle, SessionView};
use folio_consent::{ClientEnvironment, UiEvent};

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/consent/session", post(create_session))
        .route(
            "/consent/session/{id}",
            get(get_session).delete(end_session),
        )
        .route("/consent/session/{id}/events", get(session_events))
        .route("/consent/session/{id}/accept", post(accept))
        .route("/consent/session/{id}/decline", post(decline))
        .route("/consent/session/{id}/details", post(show_details))
        .route("/consent/session/{id}/details/close", post(close_details))
}

// ---------------------------------------------------------------
// Request/Response types
// ---------------------------------------------------------------

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody {
    visitor_id: String,
    #[serde(default)]
    environment: ClientEnvironment,
}

#[derive(serde::Deserialize, Default)]
struct AnswerBody {
    reason: Option<String>,
}

#[derive(serde::Serialize)]
struct AnswerResponse {
    recorded: bool,
    #[serde(flatten)]
    session: SessionView,
}

fn lookup(state: &AppState, id: &str) -> Result<Arc<SessionHandle>, ApiError> {
    state
        .session(id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Session not found"))
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<SessionView>, ApiError> {
    if !valid_visitor_id(&body.visitor_id) {
        return Err(error(StatusCode::BAD_REQUEST, "Invalid visitorId"));
    }
    let handle = state.start_session(&body.visitor_id, body.environment);
    Ok(Json(handle.view()))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(lookup(&state, &id)?.view()))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.end_session(&id) {
        Ok(Json(serde_json::json!({ "success": true })))
    } else {
        Err(error(StatusCode::NOT_FOUND, "Session not found"))
    }
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AnswerResponse>, ApiError> {
    let handle = lookup(&state, &id)?;
    let reason = reason_of(&body)?;
    let recorded = handle.bridge.user_accepted(&reason);
    Ok(Json(AnswerResponse {
        recorded,
        session: handle.view(),
    }))
}

async fn decline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AnswerResponse>, ApiError> {
    let handle = lookup(&state, &id)?;
    let reason = reason_of(&body)?;
    let recorded = handle.bridge.user_declined(&reason);
    Ok(Json(AnswerResponse {
        recorded,
        session: handle.view(),
    }))
}

async fn show_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = lookup(&state, &id)?;
    handle.bridge.user_requested_details();
    Ok(Json(serde_json::json!({ "detailsOpen": handle.bridge.details_open() })))
}

async fn close_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = lookup(&state, &id)?;
    handle.bridge.user_closed_details();
    Ok(Json(serde_json::json!({ "detailsOpen": handle.bridge.details_open() })))
}

/// The answer body is optional; an empty body means "clicked on the banner".
fn reason_of(body: &[u8]) -> Result<String, ApiError> {
    let parsed: AnswerBody = if body.iter().all(u8::is_ascii_whitespace) {
        AnswerBody::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| error(StatusCode::BAD_REQUEST, &format!("Invalid body: {}", e)))?
    };
    Ok(parsed
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "banner".to_string()))
}

// ---------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------

/// SSE stream of [`UiEvent`]s. A banner or details panel that is already
/// showing is replayed first, since the page usually subscribes after the
/// session was created.
async fn session_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<KeepAliveStream<SseStream>>, ApiError> {
    let handle = lookup(&state, &id)?;
    let mut rx = handle.bridge.subscribe();

    let mut replay = Vec::new();
    if let Some(request) = handle.bridge.pending_banner() {
        replay.push(UiEvent::ShowBanner {
            prompt_id: request.prompt_id(),
        });
    }
    if handle.bridge.details_open() {
        replay.push(UiEvent::ShowDetails);
    }
    drop(handle);

    let stream: SseStream = Box::pin(async_stream::stream! {
        for event in replay {
            yield Ok::<_, Infallible>(to_sse(&event));
        }
        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(to_sse(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("UI event subscriber lagged by {}", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &UiEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_default())
}
