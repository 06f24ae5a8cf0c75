use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::{Role, Tier};

/// Raw `users` row; role and tier are stored as text.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub tier: String,
    pub buoy_id: Option<String>,
    pub created_at: OffsetDateTime,
}

/// User record with validated authorization attributes.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String, // Argon2 hash, never exposed
    pub role: Role,
    pub tier: Tier,
    pub buoy_id: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub tier: Tier,
    pub buoy_id: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            tier: r.tier.parse()?,
            buoy_id: r.buoy_id,
            created_at: r.created_at,
        })
    }
}
