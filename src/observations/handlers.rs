use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{BulkCreateResponse, BulkRequest, BulkUpdateResponse, ObservationInput},
    pager::Page,
    redact::Visibility,
    services,
};
use crate::{
    auth::extractors::{AdminOnly, Authorized, Ingestors, ProcessedData},
    error::ApiError,
    state::AppState,
};

pub fn observation_routes() -> Router<AppState> {
    Router::new()
        .route("/observations", get(list_observations).post(create_observation))
        .route("/observations/bulk", post(bulk_create).patch(bulk_update))
        .route(
            "/observations/:id",
            get(get_observation)
                .put(replace_observation)
                .patch(update_observation)
                .delete(delete_observation),
        )
}

fn render<T: Serialize>(vis: Visibility, value: &T) -> Result<Value, ApiError> {
    vis.render(value).map_err(|e| ApiError::Internal(e.into()))
}

fn render_all<T: Serialize>(vis: Visibility, values: &[T]) -> Result<Vec<Value>, ApiError> {
    values.iter().map(|v| render(vis, v)).collect()
}

#[instrument(skip(state, claims))]
pub async fn list_observations(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<ProcessedData>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<Value>>, ApiError> {
    let vis = Visibility::for_claims(&claims);
    let page = services::list(state.observations.as_ref(), &params).await?;
    Ok(Json(page.try_map(|o| render(vis, &o))?))
}

#[instrument(skip(state, claims))]
pub async fn get_observation(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<ProcessedData>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let obs = services::get(state.observations.as_ref(), id).await?;
    Ok(Json(render(Visibility::for_claims(&claims), &obs)?))
}

#[instrument(skip(state, claims, body))]
pub async fn create_observation(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<Ingestors>,
    Json(body): Json<ObservationInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let now = OffsetDateTime::now_utc();
    let obs = services::create(state.observations.as_ref(), &claims, body, now).await?;
    Ok((
        StatusCode::CREATED,
        Json(render(Visibility::for_claims(&claims), &obs)?),
    ))
}

#[instrument(skip(state, claims, body))]
pub async fn replace_observation(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<AdminOnly>,
    Path(id): Path<Uuid>,
    Json(body): Json<ObservationInput>,
) -> Result<Json<Value>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let obs = services::replace(state.observations.as_ref(), id, body, now).await?;
    Ok(Json(render(Visibility::for_claims(&claims), &obs)?))
}

#[instrument(skip(state, claims, patch))]
pub async fn update_observation(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<AdminOnly>,
    Path(id): Path<Uuid>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let obs = services::update(state.observations.as_ref(), id, &patch, now).await?;
    Ok(Json(render(Visibility::for_claims(&claims), &obs)?))
}

#[instrument(skip(state, _caller))]
pub async fn delete_observation(
    State(state): State<AppState>,
    _caller: Authorized<AdminOnly>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    services::delete(state.observations.as_ref(), id, OffsetDateTime::now_utc()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, claims, body), fields(items = body.items.len()))]
pub async fn bulk_create(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<Ingestors>,
    Json(body): Json<BulkRequest>,
) -> Result<(StatusCode, Json<BulkCreateResponse>), ApiError> {
    let now = OffsetDateTime::now_utc();
    let report =
        services::bulk_create(state.observations.as_ref(), &claims, body.items, now).await;
    let status = if report.has_errors() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(BulkCreateResponse {
            created: render_all(Visibility::for_claims(&claims), &report.done)?,
            errors: report.errors,
        }),
    ))
}

#[instrument(skip(state, claims, body), fields(items = body.items.len()))]
pub async fn bulk_update(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<AdminOnly>,
    Json(body): Json<BulkRequest>,
) -> Result<(StatusCode, Json<BulkUpdateResponse>), ApiError> {
    let now = OffsetDateTime::now_utc();
    let report = services::bulk_update(state.observations.as_ref(), body.items, now).await;
    let status = if report.has_errors() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(BulkUpdateResponse {
            updated: render_all(Visibility::for_claims(&claims), &report.done)?,
            errors: report.errors,
        }),
    ))
}
