//! Runtime log filter.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_log_filter))
}

async fn get_logging_config(State(state): State<AppState>) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
    }))
}

async fn update_log_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
    }))
}
