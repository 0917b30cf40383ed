//! Route table.

pub mod health;
pub mod logging;
pub mod notifications;

use axum::Router;

use crate::api::server::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/notifications", notifications::router())
        .nest("/api/v1/logging", logging::router())
        .nest("/health", health::router())
        .with_state(state)
}
