//! HTTP route handlers for the consent surface.

pub mod consent;
pub mod dev;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router. Developer routes are mounted only when enabled.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut api = consent::routes();
    if state.config.dev_tools {
        api = api.merge(dev::routes());
    }

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) type ApiError = (StatusCode, Json<serde_json::Value>);

pub(crate) fn error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}
