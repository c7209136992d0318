//! Error types for SPEAR ranking
//!
//! Provides a single error enum shared by the engine and the service:
//! - Distinct variants for input, credit, and configuration failures
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

/// Result type alias using SpearError
pub type Result<T> = std::result::Result<T, SpearError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidInput,
    PayloadTooLarge,

    // Ranking errors (4xxx)
    InvalidCredit,
    DegenerateCredit,

    // Rate limiting (6xxx)
    RateLimited,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidInput => 1002,
            ErrorCode::PayloadTooLarge => 1004,

            // Ranking (4xxx)
            ErrorCode::InvalidCredit => 4001,
            ErrorCode::DegenerateCredit => 4002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }

    /// Wire name, as serialized in error responses
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::InvalidCredit => "INVALID_CREDIT",
            ErrorCode::DegenerateCredit => "DEGENERATE_CREDIT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
        }
    }
}

/// Ranking and service error types
#[derive(Error, Debug)]
pub enum SpearError {
    // Input errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Payload too large: {size} activities exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    // Credit function errors
    #[error("Credit function returned {value} for rank {rank} of {total}")]
    InvalidCredit { rank: usize, total: usize, value: f64 },

    #[error("Credit function produced an all-zero score vector at iteration {iteration}")]
    DegenerateCredit { iteration: usize },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SpearError {
    /// Shorthand for an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SpearError::InvalidInput { message: message.into() }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SpearError::InvalidInput { .. } => ErrorCode::InvalidInput,
            SpearError::Validation { .. } => ErrorCode::ValidationError,
            SpearError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            SpearError::InvalidCredit { .. } => ErrorCode::InvalidCredit,
            SpearError::DegenerateCredit { .. } => ErrorCode::DegenerateCredit,
            SpearError::RateLimited { .. } => ErrorCode::RateLimited,
            SpearError::Internal { .. } => ErrorCode::InternalError,
            SpearError::Configuration { .. } => ErrorCode::ConfigurationError,
            SpearError::Serialization(_) => ErrorCode::SerializationError,
            SpearError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            SpearError::InvalidInput { .. } |
            SpearError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 413 Payload Too Large
            SpearError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 422 Unprocessable Entity
            SpearError::InvalidCredit { .. } |
            SpearError::DegenerateCredit { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            SpearError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            SpearError::Internal { .. } |
            SpearError::Configuration { .. } |
            SpearError::Serialization(_) |
            SpearError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
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
    pub field: Option<String>,
}

impl IntoResponse for SpearError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match self {
            SpearError::Validation { field, .. } => field,
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for SpearError {
    fn from(err: config::ConfigError) -> Self {
        SpearError::Configuration {
            message: err.to_string()
        }
    }
}
