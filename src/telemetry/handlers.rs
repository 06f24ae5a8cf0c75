use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{IngestResponse, TelemetryRecord},
    services,
};
use crate::{
    auth::extractors::{Authorized, Ingestors, RawData},
    error::ApiError,
    observations::{pager::Page, services as observations},
    state::AppState,
};

pub fn telemetry_routes() -> Router<AppState> {
    Router::new()
        .route("/telemetry", get(list_telemetry).post(ingest))
        .route("/telemetry/:id", get(get_telemetry))
}

#[instrument(skip(state, claims, body))]
pub async fn ingest(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<Ingestors>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let now = OffsetDateTime::now_utc();
    let obs = services::ingest(state.observations.as_ref(), &claims, body, now).await?;
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            id: obs.id,
            message: "Ingested",
        }),
    ))
}

#[instrument(skip(state, _caller))]
pub async fn list_telemetry(
    State(state): State<AppState>,
    _caller: Authorized<RawData>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<TelemetryRecord>>, ApiError> {
    let page = services::list(state.observations.as_ref(), &params).await?;
    Ok(Json(page.map(TelemetryRecord::from)))
}

#[instrument(skip(state, _caller))]
pub async fn get_telemetry(
    State(state): State<AppState>,
    _caller: Authorized<RawData>,
    Path(id): Path<Uuid>,
) -> Result<Json<TelemetryRecord>, ApiError> {
    let obs = observations::get(state.observations.as_ref(), id).await?;
    Ok(Json(obs.into()))
}
