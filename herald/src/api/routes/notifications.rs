//! Notification intake.

use axum::{
    Json, Router, body::Bytes, extract::State, http::StatusCode, response::IntoResponse,
    routing::post,
};
use serde_json::json;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::domain::NotifierRequest;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(enqueue))
}

/// Validate a request and queue it for delivery.
///
/// The body is checked here so callers learn about bad input right away; delivery
/// itself happens later on the queue consumer.
async fn enqueue(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let publisher = state
        .publisher
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Notification queue is not running"))?;

    let notification = NotifierRequest::from_slice(&body)?.into_notification()?;
    publisher.publish(body.to_vec())?;
    debug!(kind = ?notification.kind(), "Notification queued");

    Ok((StatusCode::ACCEPTED, Json(json!({ "isOk": true, "data": {} }))))
}
