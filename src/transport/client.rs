//! HTTP client configuration
//!
//! [`HttpConfig`] describes how the shared `reqwest::Client` is built; both
//! transports are constructed from one of these when no client is supplied.

use crate::defaults;
use crate::error::{Result, ServiceError};
use std::collections::HashMap;
use std::time::Duration;

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Whole-request timeout.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// Headers sent with every request.
    pub headers: HashMap<String, String>,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Some(defaults::http::REQUEST_TIMEOUT),
            connect_timeout: Some(defaults::http::CONNECT_TIMEOUT),
            headers: HashMap::new(),
            proxy: None,
            user_agent: Some(defaults::http::USER_AGENT.to_string()),
        }
    }
}

impl HttpConfig {
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::new()
    }
}

/// Builder for [`HttpConfig`]. Unset fields keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct HttpConfigBuilder {
    timeout: Option<Option<Duration>>,
    connect_timeout: Option<Option<Duration>>,
    headers: HashMap<String, String>,
    proxy: Option<String>,
    user_agent: Option<String>,
}

impl HttpConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }
    pub fn proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> HttpConfig {
        let base = HttpConfig::default();
        HttpConfig {
            timeout: self.timeout.unwrap_or(base.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(base.connect_timeout),
            headers: self.headers,
            proxy: self.proxy,
            user_agent: self.user_agent.or(base.user_agent),
        }
    }
}

/// Build a `reqwest::Client` from `config`.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(connect_timeout) = config.connect_timeout {
        builder = builder.connect_timeout(connect_timeout);
    }

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ServiceError::ConfigurationError(format!("Invalid proxy URL: {e}")))?;
        builder = builder.proxy(proxy);
    }

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent);
    }

    if !config.headers.is_empty() {
        let mut headers = reqwest::header::HeaderMap::new();
        for (k, v) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes()).map_err(|e| {
                ServiceError::ConfigurationError(format!("Invalid header name '{k}': {e}"))
            })?;
            let value = reqwest::header::HeaderValue::from_str(v).map_err(|e| {
                ServiceError::ConfigurationError(format!("Invalid header value for '{k}': {e}"))
            })?;
            headers.insert(name, value);
        }
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| ServiceError::HttpError(format!("Failed to create HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_defaults_for_unset_fields() {
        let config = HttpConfig::builder().header("X-App", "demo").build();
        assert_eq!(config.timeout, Some(defaults::http::REQUEST_TIMEOUT));
        assert_eq!(config.user_agent.as_deref(), Some(defaults::http::USER_AGENT));
        assert_eq!(config.headers.get("X-App").map(String::as_str), Some("demo"));

        let no_timeout = HttpConfig::builder().timeout(None).build();
        assert_eq!(no_timeout.timeout, None);
    }

    #[test]
    fn builds_client_from_default_config() {
        assert!(build_http_client(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn rejects_invalid_default_headers() {
        let config = HttpConfig::builder().header("bad header", "x").build();
        let err = build_http_client(&config).unwrap_err();
        assert!(matches!(err, ServiceError::ConfigurationError(_)));
    }

    #[test]
    fn rejects_invalid_proxy() {
        let config = HttpConfig::builder().proxy("::not a url::").build();
        assert!(build_http_client(&config).is_err());
    }
}
