use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Body of `POST /observations`, `PUT /observations/:id` and of each bulk-create item.
/// Telemetry ingest reads its known fields through the same shape.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ObservationInput {
    pub buoy_id: Option<String>,
    pub observed_at: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sea_surface_temp_c: Option<f64>,
    pub air_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_mps: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub haze: Option<bool>,
    pub salinity_psu: Option<f64>,
    pub ph: Option<f64>,
    pub pollutant_index: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateResponse {
    pub created: Vec<Value>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateResponse {
    pub updated: Vec<Value>,
    pub errors: Vec<ItemError>,
}
