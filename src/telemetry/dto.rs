use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::observations::repo_types::Observation;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: Uuid,
    pub message: &'static str,
}

/// Raw view of an observation: location, instant and the payload as ingested.
#[derive(Debug, Serialize)]
pub struct TelemetryRecord {
    pub id: Uuid,
    pub buoy_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub raw_payload: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Observation> for TelemetryRecord {
    fn from(o: Observation) -> Self {
        Self {
            id: o.id,
            buoy_id: o.fields.buoy_id,
            observed_at: o.fields.observed_at,
            latitude: o.fields.latitude,
            longitude: o.fields.longitude,
            raw_payload: o.raw_payload,
            created_at: o.created_at,
        }
    }
}
