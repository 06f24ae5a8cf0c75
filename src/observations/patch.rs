use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::repo_types::ObservationFields;
use crate::{datetime::parse_param, error::ApiError};

/// A change to one stored record, applied by the store while it holds the row.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Overwrite every typed field.
    Replace(ObservationFields),
    /// Overwrite only the fields named in the request.
    Patch(FieldPatch),
}

impl Edit {
    pub fn apply(&self, current: &ObservationFields) -> ObservationFields {
        match self {
            Edit::Replace(fields) => fields.clone(),
            Edit::Patch(patch) => patch.apply(current),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    SeaSurfaceTemp,
    AirTemp,
    Humidity,
    WindSpeed,
    WindDirection,
    Precipitation,
    Salinity,
    Ph,
    PollutantIndex,
}

impl Reading {
    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "sea_surface_temp_c" => Reading::SeaSurfaceTemp,
            "air_temp_c" => Reading::AirTemp,
            "humidity_pct" => Reading::Humidity,
            "wind_speed_mps" => Reading::WindSpeed,
            "wind_direction_deg" => Reading::WindDirection,
            "precipitation_mm" => Reading::Precipitation,
            "salinity_psu" => Reading::Salinity,
            "ph" => Reading::Ph,
            "pollutant_index" => Reading::PollutantIndex,
            _ => return None,
        })
    }

    fn slot(self, fields: &mut ObservationFields) -> &mut Option<f64> {
        match self {
            Reading::SeaSurfaceTemp => &mut fields.sea_surface_temp_c,
            Reading::AirTemp => &mut fields.air_temp_c,
            Reading::Humidity => &mut fields.humidity_pct,
            Reading::WindSpeed => &mut fields.wind_speed_mps,
            Reading::WindDirection => &mut fields.wind_direction_deg,
            Reading::Precipitation => &mut fields.precipitation_mm,
            Reading::Salinity => &mut fields.salinity_psu,
            Reading::Ph => &mut fields.ph,
            Reading::PollutantIndex => &mut fields.pollutant_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Change {
    BuoyId(Option<String>),
    Timezone(Option<String>),
    Notes(Option<String>),
    Haze(Option<bool>),
    Latitude(f64),
    Longitude(f64),
    ObservedAt(OffsetDateTime),
    Reading(Reading, Option<f64>),
}

/// A validated partial update. Applying it twice yields the same fields as once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    changes: Vec<Change>,
}

fn number(key: &str, value: &Value) -> Result<f64, ApiError> {
    match value {
        Value::Null => Err(ApiError::invalid(key, "may not be null")),
        other => other
            .as_f64()
            .ok_or_else(|| ApiError::invalid(key, "must be a number")),
    }
}

fn opt_number(key: &str, value: &Value) -> Result<Option<f64>, ApiError> {
    match value {
        Value::Null => Ok(None),
        other => number(key, other).map(Some),
    }
}

fn opt_string(key: &str, value: &Value) -> Result<Option<String>, ApiError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ApiError::invalid(key, "must be a string")),
    }
}

fn opt_bool(key: &str, value: &Value) -> Result<Option<bool>, ApiError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        _ => Err(ApiError::invalid(key, "must be a boolean")),
    }
}

impl FieldPatch {
    /// Type-check every key of a PATCH body. Unknown keys are rejected.
    pub fn parse(body: &Map<String, Value>) -> Result<Self, ApiError> {
        let mut changes = Vec::with_capacity(body.len());
        for (key, value) in body {
            let change = match key.as_str() {
                "buoy_id" => Change::BuoyId(opt_string(key, value)?),
                "timezone" => Change::Timezone(opt_string(key, value)?),
                "notes" => Change::Notes(opt_string(key, value)?),
                "haze" => Change::Haze(opt_bool(key, value)?),
                "latitude" => Change::Latitude(number(key, value)?),
                "longitude" => Change::Longitude(number(key, value)?),
                "observed_at" => {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| ApiError::invalid(key, "must be an ISO-8601 string"))?;
                    Change::ObservedAt(parse_param(key, raw)?)
                }
                other => {
                    let reading = Reading::from_key(other)
                        .ok_or_else(|| ApiError::invalid(other, "unknown field"))?;
                    Change::Reading(reading, opt_number(key, value)?)
                }
            };
            changes.push(change);
        }
        Ok(Self { changes })
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn apply(&self, fields: &ObservationFields) -> ObservationFields {
        let mut out = fields.clone();
        for change in &self.changes {
            match change {
                Change::BuoyId(v) => out.buoy_id = v.clone(),
                Change::Timezone(v) => out.timezone = v.clone(),
                Change::Notes(v) => out.notes = v.clone(),
                Change::Haze(v) => out.haze = *v,
                Change::Latitude(v) => out.latitude = *v,
                Change::Longitude(v) => out.longitude = *v,
                Change::ObservedAt(v) => out.observed_at = *v,
                Change::Reading(reading, v) => *reading.slot(&mut out) = *v,
            }
        }
        out
    }
}
