use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Typed, client-writable columns of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ObservationFields {
    pub buoy_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime, // always UTC
    pub timezone: Option<String>,    // IANA name as supplied
    pub latitude: f64,
    pub longitude: f64,
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

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Observation {
    pub id: Uuid,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub fields: ObservationFields,
    pub raw_payload: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
impl ObservationFields {
    /// Minimal field set: coordinates and instant, every reading unset.
    pub fn at(observed_at: OffsetDateTime, latitude: f64, longitude: f64) -> Self {
        Self {
            buoy_id: None,
            observed_at,
            timezone: None,
            latitude,
            longitude,
            sea_surface_temp_c: None,
            air_temp_c: None,
            humidity_pct: None,
            wind_speed_mps: None,
            wind_direction_deg: None,
            precipitation_mm: None,
            haze: None,
            salinity_psu: None,
            ph: None,
            pollutant_index: None,
            notes: None,
        }
    }
}

impl Observation {
    /// A fresh record with server-assigned id and timestamps.
    pub fn new(
        fields: ObservationFields,
        raw_payload: Option<serde_json::Value>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fields,
            raw_payload,
            created_at: now,
            updated_at: now,
        }
    }
}
