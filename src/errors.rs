// ABOUTME: Unified error handling for the OAuth client, flow coordinator, and HTTP integration
// ABOUTME: Defines AppError/ErrorCode for service errors and OAuthFlowError for the callback taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Unified Error Handling System
//!
//! Two layers of errors live here:
//!
//! - [`OAuthFlowError`] classifies everything that can go wrong during one
//!   authentication attempt (denied authorization, state mismatch, failed token
//!   exchange, ...). Every variant aborts only the current attempt.
//! - [`AppError`] with [`ErrorCode`] is the service-level error used for
//!   configuration, storage and HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Authentication is required
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired,
    /// Authentication was attempted but rejected
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid,
    /// Stored credentials expired and could not be renewed
    #[serde(rename = "AUTH_EXPIRED")]
    AuthExpired,
    /// Input failed validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    /// The identity server returned an error
    #[serde(rename = "EXTERNAL_SERVICE_ERROR")]
    ExternalServiceError,
    /// The identity server could not be reached
    #[serde(rename = "EXTERNAL_SERVICE_UNAVAILABLE")]
    ExternalServiceUnavailable,
    /// Authentication against the identity server failed
    #[serde(rename = "EXTERNAL_AUTH_FAILED")]
    ExternalAuthFailed,
    /// Generic configuration error
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
    /// Required configuration is missing
    #[serde(rename = "CONFIG_MISSING")]
    ConfigMissing,
    /// Configuration value is malformed
    #[serde(rename = "CONFIG_INVALID")]
    ConfigInvalid,
    /// Unexpected internal failure
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    /// Session or token storage failure
    #[serde(rename = "STORAGE_ERROR")]
    StorageError,
    /// Data serialization/deserialization failure
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired => 401,
            Self::ExternalServiceError | Self::ExternalServiceUnavailable => 502,
            Self::ExternalAuthFailed => 503,
            Self::ConfigError
            | Self::ConfigMissing
            | Self::ConfigInvalid
            | Self::InternalError
            | Self::StorageError
            | Self::SerializationError => 500,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::InvalidInput => "The provided input is invalid",
            Self::ExternalServiceError => "The identity server encountered an error",
            Self::ExternalServiceUnavailable => "The identity server is currently unavailable",
            Self::ExternalAuthFailed => "Authentication with the identity server failed",
            Self::ConfigError => "Configuration error encountered",
            Self::ConfigMissing => "Required configuration is missing",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::InternalError => "An internal server error occurred",
            Self::StorageError => "Storage operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

/// Unified error type for the crate
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional key-value context
    pub details: serde_json::Value,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
            source: None,
        }
    }

    /// Add details to the error context
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Missing configuration value
    pub fn config_missing(key: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissing,
            format!("Required configuration {key} is not set"),
        )
    }

    /// Session or token storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Body of an [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
                details: error.details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

/// Failure modes of a single OAuth authentication attempt
///
/// None of these are fatal to the process: the HTTP boundary turns each one
/// into a redirect carrying [`OAuthFlowError::user_message`].
#[derive(Debug, Error)]
pub enum OAuthFlowError {
    /// The authorization server returned an `error` parameter
    #[error("authorization server denied the request: {error}")]
    AuthorizationDenied {
        /// OAuth error code, e.g. `access_denied`
        error: String,
        /// Optional `error_description`
        description: Option<String>,
    },

    /// The callback carried no authorization code
    #[error("callback is missing the authorization code")]
    MissingCode,

    /// The callback state does not match the pending flow
    #[error("state parameter does not match the pending flow")]
    StateMismatch,

    /// No pending flow exists but the callback looks legitimate
    #[error("no pending flow for this callback; it was likely already completed")]
    LikelyDuplicateCallback,

    /// PKCE is enabled but the pending flow has no code verifier
    #[error("code verifier missing from the pending flow")]
    MissingCodeVerifier,

    /// The token endpoint answered with a non-success status
    #[error("token exchange failed with status {status}")]
    TokenExchangeFailed {
        /// HTTP status code
        status: u16,
        /// Raw response body, for server-side diagnostics only
        body: String,
    },

    /// The user-info endpoint answered with a non-success status
    #[error("user info request failed with status {status}")]
    UserInfoFetchFailed {
        /// HTTP status code
        status: u16,
        /// Raw response body, for server-side diagnostics only
        body: String,
    },

    /// The refresh grant failed or no refresh token was available
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Transport-level HTTP failure (connect, timeout, TLS)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The authorization server answered with something unparseable
    #[error("invalid response from authorization server: {0}")]
    InvalidResponse(String),

    /// The session or token store failed
    #[error("session storage error: {0}")]
    SessionStorage(String),

    /// Credentials or endpoints are misconfigured
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OAuthFlowError {
    /// Message safe to show to an end user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthorizationDenied { error, .. } => {
                format!("OAuth authorization failed: {error}")
            }
            Self::MissingCode => "No authorization code received".to_owned(),
            Self::StateMismatch => "Invalid OAuth state. Please try logging in again.".to_owned(),
            Self::LikelyDuplicateCallback => "Authentication was already completed.".to_owned(),
            Self::MissingCodeVerifier => {
                "Your login session expired. Please try logging in again.".to_owned()
            }
            Self::TokenExchangeFailed { .. }
            | Self::UserInfoFetchFailed { .. }
            | Self::RefreshFailed(_)
            | Self::Http(_)
            | Self::InvalidResponse(_)
            | Self::SessionStorage(_)
            | Self::Configuration(_) => "Authentication failed. Please try again.".to_owned(),
        }
    }

    /// Whether this outcome should be surfaced as information rather than an error
    #[must_use]
    pub const fn is_informational(&self) -> bool {
        matches!(self, Self::LikelyDuplicateCallback)
    }

    /// Map this flow error onto the service-level error code
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::AuthorizationDenied { .. } | Self::StateMismatch => ErrorCode::AuthInvalid,
            Self::MissingCode | Self::LikelyDuplicateCallback => ErrorCode::InvalidInput,
            Self::MissingCodeVerifier => ErrorCode::AuthExpired,
            Self::TokenExchangeFailed { .. } | Self::RefreshFailed(_) => {
                ErrorCode::ExternalAuthFailed
            }
            Self::UserInfoFetchFailed { .. } | Self::InvalidResponse(_) => {
                ErrorCode::ExternalServiceError
            }
            Self::Http(_) => ErrorCode::ExternalServiceUnavailable,
            Self::SessionStorage(_) => ErrorCode::StorageError,
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
        }
    }
}

impl From<OAuthFlowError> for AppError {
    fn from(error: OAuthFlowError) -> Self {
        Self::new(error.error_code(), error.user_message()).with_source(error)
    }
}

impl From<AppError> for OAuthFlowError {
    fn from(error: AppError) -> Self {
        match error.code {
            ErrorCode::ConfigError | ErrorCode::ConfigMissing | ErrorCode::ConfigInvalid => {
                Self::Configuration(error.message)
            }
            _ => Self::SessionStorage(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::AuthRequired.http_status(), 401);
        assert_eq!(ErrorCode::InvalidInput.http_status(), 400);
        assert_eq!(ErrorCode::ExternalServiceError.http_status(), 502);
        assert_eq!(ErrorCode::StorageError.http_status(), 500);
    }

    #[test]
    fn test_flow_error_messages_do_not_leak_bodies() {
        let error = OAuthFlowError::TokenExchangeFailed {
            status: 400,
            body: "{\"error\":\"invalid_grant\",\"secret\":\"s3cr3t\"}".to_owned(),
        };
        let message = error.user_message();
        assert!(!message.contains("s3cr3t"));
        assert_eq!(message, "Authentication failed. Please try again.");
    }

    #[test]
    fn test_only_duplicate_is_informational() {
        assert!(OAuthFlowError::LikelyDuplicateCallback.is_informational());
        assert!(!OAuthFlowError::StateMismatch.is_informational());
        assert!(!OAuthFlowError::MissingCode.is_informational());
    }

    #[test]
    fn test_flow_error_converts_to_app_error() {
        let app: AppError = OAuthFlowError::MissingCodeVerifier.into();
        assert_eq!(app.code, ErrorCode::AuthExpired);
        assert_eq!(app.http_status(), 401);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::storage("session unavailable")
            .with_details(serde_json::json!({ "key": "oauth_pending_flow" }));
        let response = ErrorResponse::from(error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("STORAGE_ERROR"));
        assert!(json.contains("oauth_pending_flow"));
    }
}
