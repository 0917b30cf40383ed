//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

/// Run every registered probe.
/// Returns HTTP 200 while the service is available, even partially, and 500 otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    // Probes still running when the client goes away are cancelled with the request.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let snapshot = state.orchestrator.measure(&cancel).await;
    let available = snapshot.is_available();
    let status = if available {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "isOk": available, "data": snapshot })))
}

/// Liveness check - is the process responsive?
async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "isOk": true, "data": {} })))
}
