//! Error types for the gateway.

use aadhaar_identity::IdentityError;
use aadhaar_ledger::LedgerError;
use aadhaar_storage::StorageError;
use aadhaar_types::TypesError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Startup errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

/// Request errors. Storage details are logged, never returned.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("identity already registered")]
    DuplicateIdentity,

    #[error("could not issue a unique access token")]
    DuplicateToken,

    #[error("verification failed")]
    VerificationFailed,

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateIdentity | ApiError::DuplicateToken => StatusCode::CONFLICT,
            ApiError::VerificationFailed | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::DuplicateIdentity => "duplicate_identity",
            ApiError::DuplicateToken => "duplicate_token",
            ApiError::VerificationFailed => "verification_failed",
            ApiError::NotFound => "not_found",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Storage(_) => "storage_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // One body for every verification failure, whatever the cause.
            ApiError::VerificationFailed => (
                status,
                Json(serde_json::json!({ "status": "VERIFICATION_FAILED" })),
            )
                .into_response(),
            ApiError::Storage(detail) => {
                error!(%detail, "request failed on storage");
                (
                    status,
                    Json(ErrorResponse {
                        error: "storage_failure",
                        reason: None,
                    }),
                )
                    .into_response()
            }
            ApiError::InvalidInput(reason) => (
                status,
                Json(ErrorResponse {
                    error: "invalid_input",
                    reason: Some(reason),
                }),
            )
                .into_response(),
            other => (
                status,
                Json(ErrorResponse {
                    error: other.code(),
                    reason: None,
                }),
            )
                .into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    // serde's messages quote the offending value; never echo them.
    fn from(rejection: JsonRejection) -> Self {
        let reason = match rejection {
            JsonRejection::JsonDataError(_) => "request body has missing or mistyped fields",
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => {
                "expected request with `Content-Type: application/json`"
            }
            _ => "request body could not be read",
        };
        ApiError::InvalidInput(reason.to_string())
    }
}

impl From<TypesError> for ApiError {
    fn from(err: TypesError) -> Self {
        ApiError::InvalidInput(err.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidInput(e) => ApiError::InvalidInput(e.to_string()),
            IdentityError::DuplicateIdentity => ApiError::DuplicateIdentity,
            IdentityError::DuplicateToken => ApiError::DuplicateToken,
            IdentityError::VerificationFailed => ApiError::VerificationFailed,
            IdentityError::NotFound | IdentityError::Inactive => ApiError::NotFound,
            IdentityError::StorageFailure(e) => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidInput(e) => ApiError::InvalidInput(e.to_string()),
            LedgerError::IdentityNotFound => ApiError::NotFound,
            LedgerError::StorageFailure(e) => ApiError::Storage(e.to_string()),
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_status_codes() {
        assert_eq!(
            ApiError::InvalidInput("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::DuplicateIdentity.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::VerificationFailed.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Storage("pool timed out".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn inactive_and_missing_identities_look_alike() {
        assert!(matches!(
            ApiError::from(IdentityError::Inactive),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from(LedgerError::IdentityNotFound),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from(IdentityError::InvalidInput(TypesError::missing("pin"))),
            ApiError::InvalidInput(reason) if reason.contains("pin")
        ));
    }
}
