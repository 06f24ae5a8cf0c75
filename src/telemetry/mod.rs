use crate::state::AppState;
use axum::Router;

mod dto;
mod handlers;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::telemetry_routes()
}
