use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{
    claims::{Claims, Role, Tier},
    jwt::JwtKeys,
};
use crate::error::ApiError;

/// Verified claims of the caller; any valid access token passes.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token.trim()).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;
        Ok(AuthUser(claims))
    }
}

/// Role and tier sets a caller must fall into. An empty set places no restriction;
/// admins bypass the tier set.
#[derive(Debug, Clone, Copy)]
pub struct AccessRule {
    pub roles: &'static [Role],
    pub tiers: &'static [Tier],
}

impl AccessRule {
    pub fn check(&self, claims: &Claims) -> Result<(), ApiError> {
        if !self.roles.is_empty() && !self.roles.contains(&claims.role) {
            return Err(ApiError::Forbidden("Forbidden: insufficient role".into()));
        }
        if !self.tiers.is_empty() && !self.tiers.contains(&claims.tier) && !claims.is_admin() {
            return Err(ApiError::Forbidden("Forbidden: insufficient data tier".into()));
        }
        Ok(())
    }
}

pub trait Policy: Send + Sync + 'static {
    const RULE: AccessRule;
}

pub struct Authenticated;
pub struct AdminOnly;
/// Callers allowed to write observations: admins and devices.
pub struct Ingestors;
pub struct ProcessedData;
pub struct RawData;

impl Policy for Authenticated {
    const RULE: AccessRule = AccessRule { roles: &[], tiers: &[] };
}

impl Policy for AdminOnly {
    const RULE: AccessRule = AccessRule { roles: &[Role::Admin], tiers: &[] };
}

impl Policy for Ingestors {
    const RULE: AccessRule = AccessRule {
        roles: &[Role::Admin, Role::Device],
        tiers: &[],
    };
}

impl Policy for ProcessedData {
    const RULE: AccessRule = AccessRule {
        roles: &[],
        tiers: &[Tier::Processed, Tier::Raw],
    };
}

impl Policy for RawData {
    const RULE: AccessRule = AccessRule { roles: &[], tiers: &[Tier::Raw] };
}

/// Claims of a caller that satisfied policy `P` before the handler body runs.
pub struct Authorized<P: Policy>(pub Claims, pub PhantomData<P>);

#[async_trait]
impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    P: Policy,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if let Err(e) = P::RULE.check(&claims) {
            warn!(user_id = %claims.sub, role = %claims.role, tier = %claims.tier, "access denied");
            return Err(e);
        }
        Ok(Authorized(claims, PhantomData))
    }
}
