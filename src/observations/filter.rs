//! Compiles query-string parameters into a predicate over observations.
//!
//! The predicate is a conjunction of [`Clause`]s rendered as a SQL `WHERE` fragment
//! with [`Predicate::push_where`]. An empty predicate selects every record. Test
//! builds also evaluate it in memory.

use std::collections::HashMap;

use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

#[cfg(test)]
use super::repo_types::Observation;
use crate::{datetime::parse_param, error::ApiError};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    BuoyId(String),
    ObservedAtOrAfter(OffsetDateTime),
    ObservedAtOrBefore(OffsetDateTime),
    LatitudeAtLeast(f64),
    LatitudeAtMost(f64),
    LongitudeAtLeast(f64),
    LongitudeAtMost(f64),
}

impl Clause {
    #[cfg(test)]
    fn matches(&self, obs: &Observation) -> bool {
        let f = &obs.fields;
        match self {
            Clause::BuoyId(id) => f.buoy_id.as_deref() == Some(id.as_str()),
            Clause::ObservedAtOrAfter(t) => f.observed_at >= *t,
            Clause::ObservedAtOrBefore(t) => f.observed_at <= *t,
            Clause::LatitudeAtLeast(v) => f.latitude >= *v,
            Clause::LatitudeAtMost(v) => f.latitude <= *v,
            Clause::LongitudeAtLeast(v) => f.longitude >= *v,
            Clause::LongitudeAtMost(v) => f.longitude <= *v,
        }
    }

    fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Clause::BuoyId(id) => qb.push("buoy_id = ").push_bind(id.clone()),
            Clause::ObservedAtOrAfter(t) => qb.push("observed_at >= ").push_bind(*t),
            Clause::ObservedAtOrBefore(t) => qb.push("observed_at <= ").push_bind(*t),
            Clause::LatitudeAtLeast(v) => qb.push("latitude >= ").push_bind(*v),
            Clause::LatitudeAtMost(v) => qb.push("latitude <= ").push_bind(*v),
            Clause::LongitudeAtLeast(v) => qb.push("longitude >= ").push_bind(*v),
            Clause::LongitudeAtMost(v) => qb.push("longitude <= ").push_bind(*v),
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    #[cfg(test)]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    #[cfg(test)]
    pub fn is_identity(&self) -> bool {
        self.clauses.is_empty()
    }

    #[cfg(test)]
    pub fn matches(&self, obs: &Observation) -> bool {
        self.clauses.iter().all(|c| c.matches(obs))
    }

    /// Append ` WHERE ...` (or nothing for the identity predicate).
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (i, clause) in self.clauses.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            clause.push_sql(qb);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Parse `min_lat,min_lon,max_lat,max_lon`.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ApiError::invalid(
                "bbox",
                "expected 'min_lat,min_lon,max_lat,max_lon'",
            ));
        }
        let mut values = [0.0_f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = parse_number(part)
                .ok_or_else(|| ApiError::invalid("bbox", format!("'{part}' is not a number")))?;
        }
        let [min_lat, min_lon, max_lat, max_lon] = values;
        if min_lat > max_lat {
            return Err(ApiError::invalid("bbox", "min_lat is greater than max_lat"));
        }
        if min_lon > max_lon {
            return Err(ApiError::invalid("bbox", "min_lon is greater than max_lon"));
        }
        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }

    fn clauses(&self) -> [Clause; 4] {
        [
            Clause::LatitudeAtLeast(self.min_lat),
            Clause::LatitudeAtMost(self.max_lat),
            Clause::LongitudeAtLeast(self.min_lon),
            Clause::LongitudeAtMost(self.max_lon),
        ]
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First non-empty value among `names`.
fn first_present<'a>(params: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| params.get(*n))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn time_window(params: &HashMap<String, String>, mut pred: Predicate) -> Result<Predicate, ApiError> {
    if let Some(raw) = first_present(params, &["start", "start_date"]) {
        pred = pred.and(Clause::ObservedAtOrAfter(parse_param("start", raw)?));
    }
    if let Some(raw) = first_present(params, &["end", "end_date"]) {
        pred = pred.and(Clause::ObservedAtOrBefore(parse_param("end", raw)?));
    }
    Ok(pred)
}

fn buoy(params: &HashMap<String, String>, pred: Predicate) -> Predicate {
    match params.get("buoy_id").filter(|v| !v.is_empty()) {
        Some(id) => pred.and(Clause::BuoyId(id.clone())),
        None => pred,
    }
}

/// Full observation filter: time window, buoy, bounding box and discrete bounds.
pub fn compile(params: &HashMap<String, String>) -> Result<Predicate, ApiError> {
    let mut pred = time_window(params, Predicate::all())?;
    pred = buoy(params, pred);

    if let Some(raw) = first_present(params, &["bbox"]) {
        for clause in BoundingBox::parse(raw)?.clauses() {
            pred = pred.and(clause);
        }
    }

    let bounds: [(&str, fn(f64) -> Clause); 4] = [
        ("latitude_min", Clause::LatitudeAtLeast),
        ("latitude_max", Clause::LatitudeAtMost),
        ("longitude_min", Clause::LongitudeAtLeast),
        ("longitude_max", Clause::LongitudeAtMost),
    ];
    for (name, clause) in bounds {
        if let Some(raw) = first_present(params, &[name]) {
            let value = parse_number(raw).ok_or_else(|| ApiError::invalid(name, "must be a number"))?;
            pred = pred.and(clause(value));
        }
    }
    Ok(pred)
}

/// Telemetry listing understands only the buoy and time-window parameters.
pub fn compile_telemetry(params: &HashMap<String, String>) -> Result<Predicate, ApiError> {
    let pred = time_window(params, Predicate::all())?;
    Ok(buoy(params, pred))
}
