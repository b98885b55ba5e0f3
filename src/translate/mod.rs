pub mod cache;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use cache::TranslationCache;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
