//! Error types for SectorSite services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for resolution, encryption, usage-limit and store failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidToken,
    ExpiredToken,

    // Authorization errors (3xxx)
    Forbidden,
    TenantMismatch,

    // Resolution errors (4xxx)
    NotFound,
    SectorUnknown,
    TenantNotFound,
    RecordNotFound,

    // Conflict errors (5xxx)
    SlugTaken,

    // Limits (6xxx)
    RateLimited,
    LimitExceeded,

    // Encryption errors (7xxx)
    EncryptionFailed,
    DecryptionFailed,

    // Backing store errors (8xxx)
    StoreError,
    UpstreamError,
    AuthServiceError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            // Auth (2xxx)
            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidToken => 2002,
            ErrorCode::ExpiredToken => 2003,

            // Authz (3xxx)
            ErrorCode::Forbidden => 3001,
            ErrorCode::TenantMismatch => 3002,

            // Resolution (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::SectorUnknown => 4002,
            ErrorCode::TenantNotFound => 4003,
            ErrorCode::RecordNotFound => 4004,

            // Conflicts (5xxx)
            ErrorCode::SlugTaken => 5001,

            // Limits (6xxx)
            ErrorCode::RateLimited => 6001,
            ErrorCode::LimitExceeded => 6002,

            // Encryption (7xxx)
            ErrorCode::EncryptionFailed => 7001,
            ErrorCode::DecryptionFailed => 7002,

            // Store (8xxx)
            ErrorCode::StoreError => 8001,
            ErrorCode::UpstreamError => 8002,
            ErrorCode::AuthServiceError => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Tenant mismatch")]
    TenantMismatch,

    // Resolution errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Unknown sector '{sector}'")]
    SectorUnknown { sector: String },

    #[error("Tenant '{slug}' not found in sector '{sector}'")]
    TenantNotFound { sector: String, slug: String },

    #[error("Encrypted record not found: {id}")]
    RecordNotFound { id: String },

    // Conflict errors
    #[error("Slug '{slug}' is already in use in sector '{sector}'")]
    SlugTaken { sector: String, slug: String },

    // Limits
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    #[error("Limit exceeded for {resource}: maximum {limit}")]
    LimitExceeded {
        resource: String,
        limit: i64,
        reason: String,
    },

    // Encryption errors
    #[error("Encryption failed: {message}")]
    EncryptionFailed { message: String },

    #[error("Decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    // Backing store errors
    #[error("Store error ({status}): {message}")]
    Store { status: u16, message: String },

    #[error("Auth service error ({status}): {message}")]
    AuthService { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::TenantMismatch => ErrorCode::TenantMismatch,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::SectorUnknown { .. } => ErrorCode::SectorUnknown,
            AppError::TenantNotFound { .. } => ErrorCode::TenantNotFound,
            AppError::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            AppError::SlugTaken { .. } => ErrorCode::SlugTaken,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            AppError::EncryptionFailed { .. } => ErrorCode::EncryptionFailed,
            AppError::DecryptionFailed { .. } => ErrorCode::DecryptionFailed,
            AppError::Store { .. } => ErrorCode::StoreError,
            AppError::AuthService { .. } => ErrorCode::AuthServiceError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } | AppError::InvalidToken | AppError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            AppError::Forbidden { .. } | AppError::TenantMismatch => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::SectorUnknown { .. }
            | AppError::TenantNotFound { .. }
            | AppError::RecordNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::SlugTaken { .. } => StatusCode::CONFLICT,

            // 422 Unprocessable: ciphertext that cannot be read back
            AppError::DecryptionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 402 Payment Required: plan limit reached
            AppError::LimitExceeded { .. } => StatusCode::PAYMENT_REQUIRED,

            // 500 Internal Server Error
            AppError::EncryptionFailed { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Store { .. } | AppError::AuthService { .. } | AppError::HttpClient(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message safe to show to an end user
    pub fn user_message(&self) -> String {
        match self {
            AppError::LimitExceeded { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.user_message();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::TenantNotFound { sector, slug } => {
                Some(serde_json::json!({ "sector": sector, "slug": slug }))
            }
            AppError::LimitExceeded {
                resource, limit, ..
            } => Some(serde_json::json!({ "resource": resource, "limit": limit })),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
                request_id: None, // Should be filled by middleware
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::TenantNotFound {
            sector: "dentist".into(),
            slug: "clinic-a".into(),
        };
        assert_eq!(err.code(), ErrorCode::TenantNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Tenant 'clinic-a' not found in sector 'dentist'");
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Invalid slug".into(),
            field: Some("slug".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_limit_exceeded_uses_reason_for_users() {
        let err = AppError::LimitExceeded {
            resource: "items".into(),
            limit: 10,
            reason: "Maximum 10 item limit reached.".into(),
        };
        assert_eq!(err.user_message(), "Maximum 10 item limit reached.");
        assert!(err.is_client_error());
        assert_eq!(err.code().as_code(), 6002);
    }

    #[test]
    fn test_store_errors_are_upstream() {
        let err = AppError::Store {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_slug_taken_is_the_only_conflict() {
        let err = AppError::SlugTaken {
            sector: "dentist".into(),
            slug: "clinic-a".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code().as_code(), 5001);
    }
}
