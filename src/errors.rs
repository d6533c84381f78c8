use crate::services::error::GatewayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// An HTTP-facing error.
///
/// `code` is the semantic status written to the body's `statusCode`; it can
/// differ from the transport `status` (conflicts travel as 400 with `"409"`).
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: &'a str,
    error: &'a str,
    message: &'a str,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, error: &str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            error: error.to_string(),
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "400", "Invalid Input", msg)
    }

    pub fn missing_authorization() -> Self {
        Self::invalid_input("headers must have required property 'authorization'")
    }

    pub fn invalid_jwt(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "400", "Invalid JWT", msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "500", "Internal Server Error", msg)
    }

    /// Mutating endpoints report a missing resource as 400; the body keeps "404".
    pub fn masked(mut self) -> Self {
        if self.status == StatusCode::NOT_FOUND {
            self.status = StatusCode::BAD_REQUEST;
        }
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code, self.error, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            status_code: &self.code,
            error: &self.error,
            message: &self.message,
        });

        (self.status, body).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match err {
            GatewayError::InvalidBucketName
            | GatewayError::InvalidKey(_)
            | GatewayError::InvalidInput(_) => AppError::invalid_input(message),
            GatewayError::AccessDenied(reason) => {
                tracing::debug!("request denied: {}", reason);
                AppError::invalid_input(
                    "The resource could not be accessed with the provided credentials",
                )
            }
            GatewayError::BucketNotFound(_) | GatewayError::ObjectNotFound { .. } => {
                AppError::new(StatusCode::NOT_FOUND, "404", "not_found", message)
            }
            GatewayError::AlreadyExists(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "409", "Duplicate", message)
            }
            GatewayError::BucketNotEmpty(_) | GatewayError::BucketBusy(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "409", "Conflict", message)
            }
            GatewayError::PayloadTooLarge { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, "413", "Payload too large", message)
            }
            GatewayError::InvalidMimeType(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "415", "invalid_mime_type", message)
            }
            GatewayError::PreconditionFailed => AppError::new(
                StatusCode::PRECONDITION_FAILED,
                "412",
                "Precondition Failed",
                message,
            ),
            GatewayError::EmptyFailed { .. } => {
                tracing::warn!("{}", message);
                AppError::internal(message)
            }
            GatewayError::Backend(_)
            | GatewayError::Database(_)
            | GatewayError::CorruptMetadata(_) => {
                tracing::error!("request failed: {}", message);
                AppError::internal("An internal error occurred")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
