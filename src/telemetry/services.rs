use std::collections::HashMap;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    auth::claims::Claims,
    datetime::{canonical_date, canonical_datetime, canonical_time},
    error::ApiError,
    observations::{
        dto::ObservationInput,
        filter,
        pager::{self, Page, PageRequest},
        repo::ObservationStore,
        repo_types::Observation,
        services::{owned_buoy_id, resolve_observed_at, to_fields},
    },
};

/// Tidy the top-level `observed_at`, `date` and `time` strings (offsets kept as sent).
/// Everything else, nested objects included, is stored exactly as received.
pub fn canonicalize(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        for (key, value) in map.iter_mut() {
            let Value::String(raw) = value else { continue };
            let tidy = match key.as_str() {
                "observed_at" => canonical_datetime(raw),
                "date" => canonical_date(raw),
                "time" => canonical_time(raw),
                _ => None,
            };
            if let Some(tidy) = tidy {
                *raw = tidy;
            }
        }
    }
    body
}

/// Store one telemetry message: known fields go to typed columns, the whole body
/// (see [`canonicalize`]) to `raw_payload`.
pub async fn ingest(
    store: &dyn ObservationStore,
    claims: &Claims,
    body: Value,
    now: OffsetDateTime,
) -> Result<Observation, ApiError> {
    if !body.is_object() {
        return Err(ApiError::BadRequest("JSON body required".into()));
    }
    let mut input: ObservationInput = serde_json::from_value(body.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    input.buoy_id = owned_buoy_id(claims, input.buoy_id.take());
    let observed_at = resolve_observed_at(&input)?.unwrap_or(now);
    let fields = to_fields(input, observed_at)?;

    let obs = store
        .insert(&Observation::new(fields, Some(canonicalize(body)), now))
        .await?;
    info!(id = %obs.id, buoy_id = ?obs.fields.buoy_id, "telemetry ingested");
    Ok(obs)
}

pub async fn list(
    store: &dyn ObservationStore,
    params: &HashMap<String, String>,
) -> Result<Page<Observation>, ApiError> {
    let pred = filter::compile_telemetry(params)?;
    Ok(pager::paginate(store, &pred, PageRequest::from_params(params)).await?)
}
