//! Default Configuration Values
//!
//! This module centralizes the default values used throughout the crate.

use std::time::Duration;

/// HTTP client default configurations
pub mod http {
    use super::*;

    /// Default request timeout for HTTP requests
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default connection timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default User-Agent string for HTTP requests
    pub const USER_AGENT: &str = concat!("servicetree/", env!("CARGO_PKG_VERSION"));
}

/// Executor defaults
pub mod executor {
    /// Method used when a service declares none (or its template resolves to nothing).
    pub const METHOD: &str = "get";

    /// Separator between the config path and a caller supplied cache key.
    pub const CACHE_KEY_SEPARATOR: char = ':';
}

/// Service manager defaults
pub mod manager {
    /// Key under which init data is exposed while resolving the config document.
    pub const INIT_KEY: &str = "__init__";
}
