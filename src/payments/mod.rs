pub mod dto;
pub mod handlers;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use dto::Plan;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
