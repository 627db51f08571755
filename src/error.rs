use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::routes::ApiResponse;
use crate::services::control::ControlError;
use crate::services::mailbox::MailboxError;

/// Errors a request handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or out-of-range share index, traversal attempt, or a
    /// mutating call aimed at the virtual root.
    #[error("{0}")]
    InvalidPath(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Conflict(String),

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { file_size: u64 },

    #[error("{0}")]
    BadRequest(String),

    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn access_denied() -> Self {
        ApiError::InvalidPath("Access denied".to_string())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPath(_) | ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound("File not found".to_string()),
            std::io::ErrorKind::AlreadyExists => ApiError::Conflict("Already exists".to_string()),
            std::io::ErrorKind::PermissionDenied => ApiError::PermissionDenied(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::InvalidSeconds => ApiError::BadRequest(err.to_string()),
            ControlError::Io(e) => e.into(),
        }
    }
}

impl From<MailboxError> for ApiError {
    fn from(err: MailboxError) -> Self {
        match err {
            MailboxError::Io(e) => e.into(),
            MailboxError::Corrupt(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        // 416 carries no body, only the size of the representation.
        if let ApiError::RangeNotSatisfiable { file_size } = self {
            return (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", file_size))],
            )
                .into_response();
        }

        let body = Json(ApiResponse::<()> {
            success: false,
            message: Some(self.to_string()),
            data: None,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::access_denied().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RangeNotSatisfiable { file_size: 10 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            ApiError::bad_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let err: ApiError = std::io::Error::from(std::io::ErrorKind::AlreadyExists).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.to_string().starts_with("Permission denied"));

        let err: ApiError = std::io::Error::other("disk on fire").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_control_error_mapping() {
        let err: ApiError = ControlError::InvalidSeconds.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "seconds must be a positive integer");
    }

    #[test]
    fn test_range_response_carries_size() {
        let response = ApiError::RangeNotSatisfiable { file_size: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */42"
        );
    }
}
