pub mod browse;
pub mod control;
pub mod fs_ops;
pub mod messages;

use axum::{
    Json, Router,
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    routing::get,
};
use serde::{Serialize, de::DeserializeOwned};
use tower_http::{limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Unified API response type used across all route modules
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// `{"success": true, "message": ...}`
pub fn success(message: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.to_string()),
        data: None,
    })
}

/// Parse a JSON request body. API endpoints accept GET as well as POST, so the
/// body is read raw instead of through the `Json` extractor's content-type
/// check.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejected JSON body: {}", e);
        ApiError::bad_request("Invalid JSON body")
    })
}

/// Full route table. Everything outside `/api/<endpoint>` goes to the browse
/// dispatcher, which also answers unknown API paths.
pub fn router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);

    let upload_routes = Router::new()
        .route("/api/upload", get(fs_ops::upload).post(fs_ops::upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit));

    let api_routes = Router::new()
        .route(
            "/api/shutdown",
            get(control::schedule_shutdown).post(control::schedule_shutdown),
        )
        .route(
            "/api/cancel_shutdown",
            get(control::cancel_shutdown).post(control::cancel_shutdown),
        )
        .route(
            "/api/shutdown_status",
            get(control::shutdown_status).post(control::shutdown_status),
        )
        .route(
            "/api/create_file",
            get(fs_ops::create_file).post(fs_ops::create_file),
        )
        .route(
            "/api/create_dir",
            get(fs_ops::create_dir).post(fs_ops::create_dir),
        )
        .route(
            "/api/send_text",
            get(messages::send_text).post(messages::send_text),
        )
        .route(
            "/api/check_message",
            get(messages::check_message).post(messages::check_message),
        )
        .route(
            "/api/confirm_message",
            get(messages::confirm_message).post(messages::confirm_message),
        );

    Router::new()
        .merge(upload_routes)
        .merge(api_routes)
        .fallback(browse::dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
}
