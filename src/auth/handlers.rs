use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest},
        extractors::{AdminOnly, Authenticated, Authorized},
        jwt::JwtKeys,
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(get_me))
}

#[instrument(skip(state, _caller, payload))]
pub async fn register(
    State(state): State<AppState>,
    _caller: Authorized<AdminOnly>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let user = services::register(state.users.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let (access_token, user) =
        services::login(state.users.as_ref(), &keys, &payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        user: user.into(),
    }))
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    Authorized(claims, ..): Authorized<Authenticated>,
) -> Result<Json<PublicUser>, ApiError> {
    let user_id = claims.user_id();
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        error!(user_id = %user_id, "user not found");
        ApiError::Unauthorized("User not found".into())
    })?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::auth::claims::{Role, Tier};

    #[test]
    fn public_user_never_serializes_hash() {
        let user = crate::auth::repo_types::User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Researcher,
            tier: Tier::Processed,
            buoy_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"role\":\"researcher\""));
        assert!(!json.contains("argon2"));
    }
}
