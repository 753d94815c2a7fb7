//! Error Handling Module
//!
//! This module provides the error handling for service executors, including:
//! - Core error types (`ServiceError`, `ErrorCategory`)
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use servicetree::error::{ErrorCategory, ServiceError};
//!
//! let error = ServiceError::api_error(404, "Not Found", None);
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert_eq!(error.status_code(), Some(404));
//! ```

// Module declarations
mod conversions;
pub mod types;

// Re-exports for public API
pub use types::*;
