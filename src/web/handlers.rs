//! HTTP request handlers.

use super::AppState;
use crate::monitor::{service_snapshot, snapshot, ServiceSnapshot};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use std::collections::BTreeMap;

pub async fn handle_get_services(State(state): State<AppState>) -> Json<BTreeMap<String, ServiceSnapshot>> {
    Json(snapshot(&state.services, &state.registry, state.timezone, Utc::now()))
}

pub async fn handle_get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceSnapshot>, StatusCode> {
    let service = state
        .services
        .iter()
        .find(|s| s.name() == name)
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(service_snapshot(service, &state.registry, state.timezone, Utc::now())))
}

pub async fn handle_health() -> &'static str {
    "ok"
}
