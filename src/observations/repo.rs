use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgArguments, query::QueryAs, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    filter::Predicate,
    patch::Edit,
    repo_types::{Observation, ObservationFields},
};
use crate::quarter::is_frozen;

/// Result of a write that is refused for missing or frozen rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    Done(T),
    Missing,
    Frozen { observed_at: OffsetDateTime },
}

/// Persistence for observations. Every call is atomic: `modify` and `remove`
/// check edit protection and write while holding the row.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn insert(&self, obs: &Observation) -> anyhow::Result<Observation>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Observation>>;
    async fn count(&self, pred: &Predicate) -> anyhow::Result<i64>;
    /// Matching rows ordered by `observed_at DESC, id DESC`.
    async fn fetch(&self, pred: &Predicate, limit: i64, offset: i64)
        -> anyhow::Result<Vec<Observation>>;
    /// Apply `edit` to the typed columns and stamp `updated_at = now`.
    async fn modify(
        &self,
        id: Uuid,
        edit: &Edit,
        now: OffsetDateTime,
    ) -> anyhow::Result<Guarded<Observation>>;
    async fn remove(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<Guarded<()>>;
}

const SELECT_COLUMNS: &str = "SELECT id, buoy_id, observed_at, timezone, latitude, longitude, \
     sea_surface_temp_c, air_temp_c, humidity_pct, wind_speed_mps, wind_direction_deg, \
     precipitation_mm, haze, salinity_psu, ph, pollutant_index, notes, raw_payload, \
     created_at, updated_at FROM observations";

#[derive(Clone)]
pub struct PgObservationStore {
    db: PgPool,
}

impl PgObservationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

type ObservationQuery<'q> = QueryAs<'q, Postgres, Observation, PgArguments>;

fn bind_fields<'q>(q: ObservationQuery<'q>, f: &'q ObservationFields) -> ObservationQuery<'q> {
    q.bind(&f.buoy_id)
        .bind(f.observed_at)
        .bind(&f.timezone)
        .bind(f.latitude)
        .bind(f.longitude)
        .bind(f.sea_surface_temp_c)
        .bind(f.air_temp_c)
        .bind(f.humidity_pct)
        .bind(f.wind_speed_mps)
        .bind(f.wind_direction_deg)
        .bind(f.precipitation_mm)
        .bind(f.haze)
        .bind(f.salinity_psu)
        .bind(f.ph)
        .bind(f.pollutant_index)
        .bind(&f.notes)
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    async fn insert(&self, obs: &Observation) -> anyhow::Result<Observation> {
        let q = sqlx::query_as::<_, Observation>(
            r#"
            INSERT INTO observations (
                id, buoy_id, observed_at, timezone, latitude, longitude,
                sea_surface_temp_c, air_temp_c, humidity_pct, wind_speed_mps,
                wind_direction_deg, precipitation_mm, haze, salinity_psu, ph,
                pollutant_index, notes, raw_payload, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING id, buoy_id, observed_at, timezone, latitude, longitude,
                      sea_surface_temp_c, air_temp_c, humidity_pct, wind_speed_mps,
                      wind_direction_deg, precipitation_mm, haze, salinity_psu, ph,
                      pollutant_index, notes, raw_payload, created_at, updated_at
            "#,
        )
        .bind(obs.id);
        let row = bind_fields(q, &obs.fields)
            .bind(&obs.raw_payload)
            .bind(obs.created_at)
            .bind(obs.updated_at)
            .fetch_one(&self.db)
            .await
            .context("insert observation")?;
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Observation>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        qb.push(" WHERE id = ").push_bind(id);
        let row = qb
            .build_query_as::<Observation>()
            .fetch_optional(&self.db)
            .await
            .context("get observation")?;
        Ok(row)
    }

    async fn count(&self, pred: &Predicate) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM observations");
        pred.push_where(&mut qb);
        let total = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await
            .context("count observations")?;
        Ok(total)
    }

    async fn fetch(
        &self,
        pred: &Predicate,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Observation>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        pred.push_where(&mut qb);
        qb.push(" ORDER BY observed_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb
            .build_query_as::<Observation>()
            .fetch_all(&self.db)
            .await
            .context("list observations")?;
        Ok(rows)
    }

    async fn modify(
        &self,
        id: Uuid,
        edit: &Edit,
        now: OffsetDateTime,
    ) -> anyhow::Result<Guarded<Observation>> {
        let mut tx = self.db.begin().await.context("begin observation update")?;

        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        qb.push(" WHERE id = ").push_bind(id).push(" FOR UPDATE");
        let current = qb
            .build_query_as::<Observation>()
            .fetch_optional(&mut *tx)
            .await
            .context("lock observation")?;
        let Some(current) = current else {
            return Ok(Guarded::Missing);
        };
        if is_frozen(current.fields.observed_at, now) {
            return Ok(Guarded::Frozen {
                observed_at: current.fields.observed_at,
            });
        }

        let fields = edit.apply(&current.fields);
        let q = sqlx::query_as::<_, Observation>(
            r#"
            UPDATE observations
               SET buoy_id = $2, observed_at = $3, timezone = $4, latitude = $5,
                   longitude = $6, sea_surface_temp_c = $7, air_temp_c = $8,
                   humidity_pct = $9, wind_speed_mps = $10, wind_direction_deg = $11,
                   precipitation_mm = $12, haze = $13, salinity_psu = $14, ph = $15,
                   pollutant_index = $16, notes = $17, updated_at = $18
             WHERE id = $1
            RETURNING id, buoy_id, observed_at, timezone, latitude, longitude,
                      sea_surface_temp_c, air_temp_c, humidity_pct, wind_speed_mps,
                      wind_direction_deg, precipitation_mm, haze, salinity_psu, ph,
                      pollutant_index, notes, raw_payload, created_at, updated_at
            "#,
        )
        .bind(id);
        let row = bind_fields(q, &fields)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .context("update observation")?;
        tx.commit().await.context("commit observation update")?;
        Ok(Guarded::Done(row))
    }

    async fn remove(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<Guarded<()>> {
        let mut tx = self.db.begin().await.context("begin observation delete")?;

        let observed_at: Option<OffsetDateTime> =
            sqlx::query_scalar("SELECT observed_at FROM observations WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("lock observation")?;
        let Some(observed_at) = observed_at else {
            return Ok(Guarded::Missing);
        };
        if is_frozen(observed_at, now) {
            return Ok(Guarded::Frozen { observed_at });
        }

        sqlx::query("DELETE FROM observations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete observation")?;
        tx.commit().await.context("commit observation delete")?;
        Ok(Guarded::Done(()))
    }
}
