use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    claims::{Role, Tier},
    dto::RegisterRequest,
    jwt::JwtKeys,
    password::{hash_password, verify_password, MIN_PASSWORD_LEN},
    repo::{DuplicateEmail, UserStore},
    repo_types::{NewUser, User},
};
use crate::{config::BootstrapAdmin, error::ApiError};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register(users: &dyn UserStore, req: RegisterRequest) -> Result<User, ApiError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::invalid("email", "not a valid email address"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let buoy_id = req
        .buoy_id
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());
    if req.role == Role::Device && buoy_id.is_none() {
        return Err(ApiError::invalid("buoy_id", "required for device accounts"));
    }

    if users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = users
        .create(NewUser {
            email: email.clone(),
            password_hash,
            role: req.role,
            tier: req.tier,
            buoy_id,
        })
        .await
        .map_err(|e| {
            if e.is::<DuplicateEmail>() {
                warn!(email = %email, "email registered concurrently");
                ApiError::Conflict("User already exists".into())
            } else {
                ApiError::Internal(e)
            }
        })?;
    info!(user_id = %user.id, role = %user.role, tier = %user.tier, "user registered");
    Ok(user)
}

/// Check credentials and issue an access token.
pub async fn login(
    users: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<(String, User), ApiError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());

    let Some(user) = users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(invalid());
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let token = keys.sign(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok((token, user))
}

/// Create the configured admin account unless that email already exists.
pub async fn ensure_bootstrap_admin(
    users: &dyn UserStore,
    admin: &BootstrapAdmin,
) -> anyhow::Result<()> {
    let email = normalize_email(&admin.email);
    if users.find_by_email(&email).await?.is_some() {
        return Ok(());
    }
    let created = users
        .create(NewUser {
            email,
            password_hash: hash_password(&admin.password)?,
            role: Role::Admin,
            tier: Tier::Raw,
            buoy_id: None,
        })
        .await;
    let user = match created {
        Err(e) if e.is::<DuplicateEmail>() => return Ok(()),
        other => other?,
    };
    info!(user_id = %user.id, email = %user.email, "bootstrap admin created");
    Ok(())
}
