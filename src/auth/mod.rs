use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod jwt;
#[cfg(test)]
pub(crate) mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod reset;
mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
