//! Developer routes for seeding and inspecting consent records. Mounted only
//! when `FOLIO_DEV_TOOLS` is enabled.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::{error, ApiError};
use crate::state::{valid_visitor_id, AppState};
use folio_consent::DevStatus;
use folio_store::RegionClassification;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dev/consent/region", post(force_region))
        .route("/dev/consent/clear", post(clear))
        .route("/dev/consent/status/{visitor_id}", get(status))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForceRegionBody {
    visitor_id: String,
    restricted: bool,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorBody {
    visitor_id: String,
}

fn check_visitor(id: &str) -> Result<(), ApiError> {
    if valid_visitor_id(id) {
        Ok(())
    } else {
        Err(error(StatusCode::BAD_REQUEST, "Invalid visitorId"))
    }
}

async fn force_region(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForceRegionBody>,
) -> Result<Json<RegionClassification>, ApiError> {
    check_visitor(&body.visitor_id)?;
    Ok(Json(
        state.dev_tools(&body.visitor_id).force_region(body.restricted),
    ))
}

async fn clear(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VisitorBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_visitor(&body.visitor_id)?;
    state.dev_tools(&body.visitor_id).clear_all();
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(visitor_id): Path<String>,
) -> Result<Json<DevStatus>, ApiError> {
    check_visitor(&visitor_id)?;
    let session = state.latest_session_for(&visitor_id);
    Ok(Json(
        state
            .dev_tools(&visitor_id)
            .status(session.as_ref().map(|s| &s.manager)),
    ))
}
