use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod filter;
mod handlers;
pub mod pager;
pub mod patch;
pub mod redact;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::observation_routes()
}
