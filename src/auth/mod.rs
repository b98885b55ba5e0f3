use axum::Router;

use crate::state::AppState;

mod dto;
pub mod extractors;
mod handlers;
pub mod password;
pub mod repo;
pub mod tokens;

pub use extractors::AuthUser;

pub fn router() -> Router<AppState> {
    handlers::auth_routes().merge(handlers::me_routes())
}
