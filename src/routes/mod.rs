//! Route modules for the cspace bridge

pub mod bot;
pub mod health;
pub mod platform;
pub mod upload;

use axum::Router;

use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/upload", upload::router())
        .nest("/api/v1/bot", bot::router())
        .merge(platform::router())
        .with_state(state)
}
