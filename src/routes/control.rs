use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, parse_json, success};
use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
struct ShutdownRequest {
    #[serde(default)]
    seconds: serde_json::Value,
}

/// Compatibility shape kept for the browser pages and desktop tooling.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// POST /api/shutdown
pub async fn schedule_shutdown(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<()>>> {
    let request: ShutdownRequest = parse_json(&body)?;

    // Only a JSON integer counts; "30" and 30.5 are rejected.
    let seconds = request
        .seconds
        .as_u64()
        .filter(|&seconds| seconds > 0)
        .ok_or_else(|| ApiError::bad_request("seconds must be a positive integer"))?;

    state.control.request_schedule(seconds).await?;
    Ok(success("Shutdown scheduled"))
}

/// POST /api/cancel_shutdown
pub async fn cancel_shutdown(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<()>>> {
    state.control.request_cancel().await?;
    Ok(success("Shutdown cancellation requested"))
}

/// GET|POST /api/shutdown_status
pub async fn shutdown_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.control.status_text(),
    })
}
