use std::collections::HashMap;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{ItemError, ObservationInput},
    filter,
    pager::{self, Page, PageRequest},
    patch::{Edit, FieldPatch},
    repo::{Guarded, ObservationStore},
    repo_types::{Observation, ObservationFields},
};
use crate::{
    auth::claims::{Claims, Role},
    datetime::{from_local_parts, parse_param},
    error::ApiError,
    quarter::quarter_start,
};

pub const FROZEN_MESSAGE: &str = "Edits to records prior to the current quarter are not allowed.";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Observation {id} not found"))
}

/// `observed_at` from an explicit timestamp, else from `date` + `time` (+ `timezone`).
/// `None` when the input carries neither. A blank `observed_at` is an error, not absent.
pub(crate) fn resolve_observed_at(
    input: &ObservationInput,
) -> Result<Option<OffsetDateTime>, ApiError> {
    if let Some(raw) = input.observed_at.as_deref() {
        return parse_param("observed_at", raw).map(Some);
    }
    match (present(&input.date), present(&input.time)) {
        (Some(date), Some(time)) => {
            from_local_parts(date, time, present(&input.timezone)).map(Some)
        }
        _ => Ok(None),
    }
}

/// Device callers always write under the buoy bound to their account.
pub(crate) fn owned_buoy_id(claims: &Claims, requested: Option<String>) -> Option<String> {
    if claims.role == Role::Device {
        return claims.buoy_id.clone();
    }
    requested
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
}

pub(crate) fn to_fields(
    input: ObservationInput,
    observed_at: OffsetDateTime,
) -> Result<ObservationFields, ApiError> {
    let latitude = input
        .latitude
        .ok_or_else(|| ApiError::invalid("latitude", "is required"))?;
    let longitude = input
        .longitude
        .ok_or_else(|| ApiError::invalid("longitude", "is required"))?;
    Ok(ObservationFields {
        buoy_id: input.buoy_id,
        observed_at,
        timezone: present(&input.timezone).map(str::to_string),
        latitude,
        longitude,
        sea_surface_temp_c: input.sea_surface_temp_c,
        air_temp_c: input.air_temp_c,
        humidity_pct: input.humidity_pct,
        wind_speed_mps: input.wind_speed_mps,
        wind_direction_deg: input.wind_direction_deg,
        precipitation_mm: input.precipitation_mm,
        haze: input.haze,
        salinity_psu: input.salinity_psu,
        ph: input.ph,
        pollutant_index: input.pollutant_index,
        notes: input.notes,
    })
}

fn required_observed_at(input: &ObservationInput) -> Result<OffsetDateTime, ApiError> {
    resolve_observed_at(input)?.ok_or_else(|| {
        ApiError::invalid("observed_at", "required (or provide date and time)")
    })
}

/// Map a guarded store write onto 404 / 409.
fn settle<T>(id: Uuid, outcome: Guarded<T>, now: OffsetDateTime) -> Result<T, ApiError> {
    match outcome {
        Guarded::Done(value) => Ok(value),
        Guarded::Missing => Err(not_found(id)),
        Guarded::Frozen { observed_at } => {
            warn!(
                id = %id,
                observed_at = %observed_at,
                quarter_start = %quarter_start(now),
                "edit rejected: record is frozen"
            );
            Err(ApiError::Conflict(FROZEN_MESSAGE.into()))
        }
    }
}

pub async fn create(
    store: &dyn ObservationStore,
    claims: &Claims,
    mut input: ObservationInput,
    now: OffsetDateTime,
) -> Result<Observation, ApiError> {
    input.buoy_id = owned_buoy_id(claims, input.buoy_id.take());
    let observed_at = required_observed_at(&input)?;
    let fields = to_fields(input, observed_at)?;
    let obs = store.insert(&Observation::new(fields, None, now)).await?;
    info!(id = %obs.id, buoy_id = ?obs.fields.buoy_id, "observation created");
    Ok(obs)
}

pub async fn get(store: &dyn ObservationStore, id: Uuid) -> Result<Observation, ApiError> {
    store.get(id).await?.ok_or_else(|| not_found(id))
}

pub async fn list(
    store: &dyn ObservationStore,
    params: &HashMap<String, String>,
) -> Result<Page<Observation>, ApiError> {
    let pred = filter::compile(params)?;
    let req = PageRequest::from_params(params);
    Ok(pager::paginate(store, &pred, req).await?)
}

/// Full replace: every typed field is overwritten, id / raw_payload / created_at are kept.
pub async fn replace(
    store: &dyn ObservationStore,
    id: Uuid,
    input: ObservationInput,
    now: OffsetDateTime,
) -> Result<Observation, ApiError> {
    let observed_at = required_observed_at(&input)?;
    let edit = Edit::Replace(to_fields(input, observed_at)?);
    let obs = settle(id, store.modify(id, &edit, now).await?, now)?;
    info!(id = %obs.id, "observation replaced");
    Ok(obs)
}

pub async fn update(
    store: &dyn ObservationStore,
    id: Uuid,
    patch: &Map<String, Value>,
    now: OffsetDateTime,
) -> Result<Observation, ApiError> {
    let patch = FieldPatch::parse(patch)?;
    let keys = patch.len();
    let obs = settle(id, store.modify(id, &Edit::Patch(patch), now).await?, now)?;
    info!(id = %obs.id, keys, "observation updated");
    Ok(obs)
}

pub async fn delete(
    store: &dyn ObservationStore,
    id: Uuid,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    settle(id, store.remove(id, now).await?, now)?;
    info!(id = %id, "observation deleted");
    Ok(())
}

// --- bulk ---

/// Per-item outcomes of a bulk call. Each item commits on its own.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub done: Vec<Observation>,
    pub errors: Vec<ItemError>,
}

impl BulkReport {
    fn record(&mut self, index: usize, id: Option<Uuid>, outcome: Result<Observation, ApiError>) {
        match outcome {
            Ok(obs) => self.done.push(obs),
            Err(err) => self.errors.push(ItemError {
                index,
                id,
                error: item_message(index, err),
            }),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn item_message(index: usize, err: ApiError) -> String {
    match err {
        ApiError::Internal(e) => {
            error!(index, error = ?e, "bulk item failed");
            "internal error".into()
        }
        other => other.to_string(),
    }
}

fn not_an_object() -> ApiError {
    ApiError::BadRequest("Item must be an object".into())
}

async fn create_item(
    store: &dyn ObservationStore,
    claims: &Claims,
    item: Value,
    now: OffsetDateTime,
) -> Result<Observation, ApiError> {
    if !item.is_object() {
        return Err(not_an_object());
    }
    let mut input: ObservationInput =
        serde_json::from_value(item).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    input.buoy_id = owned_buoy_id(claims, input.buoy_id.take());
    if input.buoy_id.is_none() {
        return Err(ApiError::BadRequest(
            "Missing required field 'buoy_id'".into(),
        ));
    }
    let observed_at = resolve_observed_at(&input)?.unwrap_or(now);
    let fields = to_fields(input, observed_at)?;
    Ok(store.insert(&Observation::new(fields, None, now)).await?)
}

pub async fn bulk_create(
    store: &dyn ObservationStore,
    claims: &Claims,
    items: Vec<Value>,
    now: OffsetDateTime,
) -> BulkReport {
    let mut report = BulkReport::default();
    for (index, item) in items.into_iter().enumerate() {
        let outcome = create_item(store, claims, item, now).await;
        report.record(index, None, outcome);
    }
    info!(
        created = report.done.len(),
        failed = report.errors.len(),
        "bulk create finished"
    );
    report
}

fn item_id(map: &mut Map<String, Value>) -> Result<Uuid, ApiError> {
    match map.remove("id") {
        None | Some(Value::Null) => Err(ApiError::BadRequest("Missing id".into())),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ApiError::BadRequest("Missing id".into()))
        }
        Some(raw) => raw
            .as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| ApiError::invalid("id", "not a valid UUID")),
    }
}

pub async fn bulk_update(
    store: &dyn ObservationStore,
    items: Vec<Value>,
    now: OffsetDateTime,
) -> BulkReport {
    let mut report = BulkReport::default();
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut patch) = item else {
            report.record(index, None, Err(not_an_object()));
            continue;
        };
        let id = match item_id(&mut patch) {
            Ok(id) => id,
            Err(e) => {
                report.record(index, None, Err(e));
                continue;
            }
        };
        let outcome = update(store, id, &patch, now).await;
        report.record(index, Some(id), outcome);
    }
    info!(
        updated = report.done.len(),
        failed = report.errors.len(),
        "bulk update finished"
    );
    report
}
