use crate::storage::StoreError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types
///
/// Each variant carries the context message shown to the client; the body
/// is plain text of the form `<context>: <cause>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request
    #[error("{context}: {cause}")]
    BadRequest { context: &'static str, cause: String },

    /// Request body over the accepted size
    #[error("{context}: {cause}")]
    PayloadTooLarge { context: &'static str, cause: String },

    /// Missing or wrong token
    #[error("Unauthorized request")]
    Unauthorized,

    /// Storage collaborator failed
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    /// Internal server error
    #[error("{context}: {cause}")]
    Internal { context: &'static str, cause: String },
}

impl AppError {
    pub fn bad_request(context: &'static str, cause: impl ToString) -> Self {
        Self::BadRequest {
            context,
            cause: cause.to_string(),
        }
    }

    pub fn payload_too_large(context: &'static str, cause: impl ToString) -> Self {
        Self::PayloadTooLarge {
            context,
            cause: cause.to_string(),
        }
    }

    pub fn storage(context: &'static str, source: StoreError) -> Self {
        Self::Storage { context, source }
    }

    pub fn internal(context: &'static str, cause: impl ToString) -> Self {
        Self::Internal {
            context,
            cause: cause.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Storage { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", message);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", message);
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::bad_request("Error parsing event JSON", "missing field `time`");
        assert_eq!(
            error.to_string(),
            "Error parsing event JSON: missing field `time`"
        );

        let error = AppError::storage("Error writing to DB", StoreError::SinkClosed);
        assert!(error.to_string().starts_with("Error writing to DB: "));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::bad_request("Bad params", "x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::payload_too_large("Error reading request body", "too big").status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::storage("Error writing to DB", StoreError::Backend("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::internal("Error reading request body", "eof").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_into_response_is_plain_text() {
        let response = AppError::bad_request("Bad params", "pageSize must be positive").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Bad params: pageSize must be positive");
    }
}
