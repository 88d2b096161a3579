use crate::state::AppState;
use axum::Router;

pub mod confirmation;
mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
mod validators;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::user_routes())
}
