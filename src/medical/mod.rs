pub mod dto;
pub mod handlers;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo::MedicalReport;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::function_routes())
        .merge(handlers::routes())
}
