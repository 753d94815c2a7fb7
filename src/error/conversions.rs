//! Type Conversions for ServiceError
//!
//! This module contains From trait implementations for converting
//! common error types into ServiceError.

use super::types::ServiceError;

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidArgument(format!("Invalid URL: {err}"))
    }
}

impl From<regex::Error> for ServiceError {
    fn from(err: regex::Error) -> Self {
        Self::ConfigurationError(format!("Invalid mapper pattern: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ServiceError = json_err.into();
        assert!(matches!(err, ServiceError::ParseError(_)));
    }

    #[test]
    fn test_from_url_parse_error() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: ServiceError = parse_err.into();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }
}
