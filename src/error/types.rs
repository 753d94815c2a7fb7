//! Core error types.

use serde_json::Value;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Error raised while building service trees or executing requests.
///
/// The type is `Clone` so that a failed outcome stored in the response
/// cache can be replayed to every caller that joins the same key.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// A caller supplied an argument the executor cannot use.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The service configuration document is malformed.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A template could not be resolved against the trigger data.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Network level failure (connect, DNS, body read, ...).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The remote answered with a non-success status.
    #[error("API error {status}: {message}")]
    ApiError {
        status: u16,
        message: String,
        /// Parsed response body (JSON when the server declared it, text otherwise).
        response: Option<Value>,
    },

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The in-flight request was cancelled through `abort()`.
    #[error("Request aborted")]
    Aborted,

    /// Operation not available for this transport or configuration.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Coarse classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised synchronously while configuring; never cached.
    Construction,
    /// Template resolution failure.
    Resolution,
    /// Network level failure.
    Transport,
    /// 4xx responses.
    Client,
    /// 5xx responses (and other non-success statuses).
    Server,
    /// Parse failures on an otherwise successful exchange.
    Parsing,
    /// Cancelled by the caller.
    Cancelled,
}

impl ServiceError {
    /// Build an API error from a status, message and optional parsed body.
    pub fn api_error(status: u16, message: impl Into<String>, response: Option<Value>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
            response,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed response body carried by the error, if any.
    pub fn response_body(&self) -> Option<&Value> {
        match self {
            Self::ApiError { response, .. } => response.as_ref(),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_)
            | Self::ConfigurationError(_)
            | Self::UnsupportedOperation(_) => ErrorCategory::Construction,
            Self::TemplateError(_) => ErrorCategory::Resolution,
            Self::HttpError(_) => ErrorCategory::Transport,
            Self::ApiError { status, .. } if (400..500).contains(status) => ErrorCategory::Client,
            Self::ApiError { .. } => ErrorCategory::Server,
            Self::ParseError(_) => ErrorCategory::Parsing,
            Self::Aborted => ErrorCategory::Cancelled,
        }
    }

    /// Whether the error was raised while configuring rather than sending.
    pub fn is_construction(&self) -> bool {
        self.category() == ErrorCategory::Construction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_exposes_status_and_body() {
        let err = ServiceError::api_error(404, "Not Found", Some(serde_json::json!({"e": 1})));
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.response_body(), Some(&serde_json::json!({"e": 1})));
        assert_eq!(err.category(), ErrorCategory::Client);
    }

    #[test]
    fn server_statuses_are_server_category() {
        let err = ServiceError::api_error(503, "Service Unavailable", None);
        assert_eq!(err.category(), ErrorCategory::Server);
        assert!(!err.is_construction());
    }

    #[test]
    fn invalid_argument_is_construction() {
        let err = ServiceError::InvalidArgument("bad url".into());
        assert!(err.is_construction());
        assert_eq!(err.status_code(), None);
    }
}
