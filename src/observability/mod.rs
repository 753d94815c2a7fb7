//! Request/response observation
//!
//! Executors report every exchange to a [`RequestObserver`]: `request` once
//! before dispatch, then either `response` (after the body has been parsed
//! and before any response transformer runs) or `error`. The default
//! observer, [`TracingObserver`], renders the exchange through `tracing`.

use crate::error::ServiceError;
use crate::execution::ResolvedRequest;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Normalized view of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInfo {
    pub request_id: String,
    pub method: String,
    /// URL including the query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Time between request assembly and the observer call.
    pub elapsed: Duration,
}

impl RequestInfo {
    pub fn from_request(request: &ResolvedRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            method: request.method.as_str().to_string(),
            url: request.full_url(),
            headers: request.headers.clone(),
            body: request.body.as_json(),
            elapsed: request.elapsed(),
        }
    }

    /// Scheme of the URL in upper case (`HTTP`, `HTTPS`), empty for relative URLs.
    pub fn protocol(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.scheme().to_ascii_uppercase())
            .unwrap_or_default()
    }
}

/// Hook observing outgoing requests and their outcome.
pub trait RequestObserver: Send + Sync {
    fn request(&self, _info: &RequestInfo) {}

    fn response(&self, _status: u16, _info: &RequestInfo, _body: &Value) {}

    fn error(&self, _error: &ServiceError, _info: &RequestInfo) {}
}

/// Rendering style of [`TracingObserver`] lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Column aligned.
    #[default]
    Formatted,
    /// Single spaced.
    Plain,
}

/// Logging options. Unset fields inherit from the layer below when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Log the request line before dispatch.
    pub outgoing: Option<bool>,
    /// Log headers and body for every response, not only failures.
    pub verbose: Option<bool>,
    pub format: Option<LogFormat>,
    pub prefix: Option<String>,
    /// Prefix lines with the request start timestamp.
    pub timestamp: Option<bool>,
}

impl LogOptions {
    /// Key-by-key merge; fields set on `overrides` win.
    pub fn merged_with(&self, overrides: &LogOptions) -> LogOptions {
        LogOptions {
            outgoing: overrides.outgoing.or(self.outgoing),
            verbose: overrides.verbose.or(self.verbose),
            format: overrides.format.or(self.format),
            prefix: overrides.prefix.clone().or_else(|| self.prefix.clone()),
            timestamp: overrides.timestamp.or(self.timestamp),
        }
    }

    pub fn with_outgoing(mut self, outgoing: bool) -> Self {
        self.outgoing = Some(outgoing);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Observer backed by `tracing` (target `servicetree::http`).
#[derive(Clone, Default)]
pub struct TracingObserver {
    options: LogOptions,
}

impl fmt::Debug for TracingObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingObserver")
            .field("options", &self.options)
            .finish()
    }
}

impl TracingObserver {
    pub fn new(options: LogOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LogOptions {
        &self.options
    }

    fn prefix(&self, info: &RequestInfo) -> String {
        let mut out = String::new();
        if let Some(prefix) = self.options.prefix.as_deref().filter(|p| !p.is_empty()) {
            out.push_str(&format!("[{prefix}] "));
        }
        if self.options.timestamp.unwrap_or(false) {
            let elapsed = chrono::Duration::from_std(info.elapsed)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let started = chrono::Utc::now() - elapsed;
            out.push_str(&format!("[{}] ", started.timestamp_millis()));
        }
        out
    }

    fn columns(&self, cells: &[(&str, usize)]) -> String {
        match self.options.format.unwrap_or_default() {
            LogFormat::Formatted => cells
                .iter()
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join(" "),
            LogFormat::Plain => cells
                .iter()
                .map(|(cell, _)| *cell)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Request line, e.g. `HTTPS GET   https://a.com/x (pending)`.
    pub fn request_line(&self, info: &RequestInfo) -> String {
        let protocol = info.protocol();
        format!(
            "{}{} (pending)",
            self.prefix(info),
            self.columns(&[(&protocol, 5), (&info.method, 5), (&info.url, 0)])
        )
    }

    /// Response line, e.g. `HTTPS GET   200     https://a.com/x (12ms)`.
    pub fn response_line(&self, status: u16, info: &RequestInfo) -> String {
        let protocol = info.protocol();
        let status = status.to_string();
        format!(
            "{}{} ({}ms)",
            self.prefix(info),
            self.columns(&[(&protocol, 5), (&info.method, 5), (&status, 7), (&info.url, 0)]),
            info.elapsed.as_millis()
        )
    }

    fn detail_lines(&self, info: &RequestInfo, body: &Value) {
        let prefix = self.prefix(info);
        let headers: serde_json::Map<String, Value> = info
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let headers = Value::Object(headers);
        tracing::info!(target: "servicetree::http", request_id=%info.request_id, "{prefix}Headers {headers}");
        tracing::info!(target: "servicetree::http", request_id=%info.request_id, "{prefix}Body {body}");
    }
}

impl RequestObserver for TracingObserver {
    fn request(&self, info: &RequestInfo) {
        if self.options.outgoing.unwrap_or(false) {
            tracing::info!(target: "servicetree::http", request_id=%info.request_id, "{}", self.request_line(info));
        }
    }

    fn response(&self, status: u16, info: &RequestInfo, body: &Value) {
        tracing::info!(target: "servicetree::http", request_id=%info.request_id, status, "{}", self.response_line(status, info));
        if self.options.verbose.unwrap_or(false) || status >= 400 {
            self.detail_lines(info, body);
        }
    }

    fn error(&self, error: &ServiceError, info: &RequestInfo) {
        let prefix = self.prefix(info);
        if let Some(status) = error.status_code() {
            tracing::info!(target: "servicetree::http", request_id=%info.request_id, status, "{}", self.response_line(status, info));
            self.detail_lines(info, error.response_body().unwrap_or(&Value::Null));
        }
        tracing::error!(target: "servicetree::http", request_id=%info.request_id, "{prefix}Error {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{HttpMethod, ResolvedRequest};

    fn info() -> RequestInfo {
        let mut req = ResolvedRequest::new(HttpMethod::Get, "https://a.com/x");
        req.query.push(("q".into(), "1".into()));
        RequestInfo::from_request(&req)
    }

    #[test]
    fn merges_log_options_key_by_key() {
        let global = LogOptions::default().with_outgoing(true).with_prefix("g");
        let local = LogOptions::default().with_prefix("l").with_verbose(true);
        let merged = global.merged_with(&local);
        assert_eq!(merged.outgoing, Some(true));
        assert_eq!(merged.verbose, Some(true));
        assert_eq!(merged.prefix.as_deref(), Some("l"));
    }

    #[test]
    fn formats_request_and_response_lines() {
        let info = info();
        let observer = TracingObserver::new(LogOptions::default().with_prefix("svc"));
        assert_eq!(info.protocol(), "HTTPS");
        assert_eq!(
            observer.request_line(&info),
            "[svc] HTTPS GET   https://a.com/x?q=1 (pending)"
        );
        let plain = TracingObserver::new(LogOptions::default().with_format(LogFormat::Plain));
        assert!(plain.response_line(404, &info).starts_with("HTTPS GET 404 https://a.com/x?q=1 ("));
    }

    #[tracing_test::traced_test]
    #[test]
    fn outgoing_controls_request_logging() {
        let info = info();
        TracingObserver::new(LogOptions::default()).request(&info);
        assert!(!logs_contain("(pending)"));
        TracingObserver::new(LogOptions::default().with_outgoing(true)).request(&info);
        assert!(logs_contain("(pending)"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn failures_log_headers_and_body() {
        let mut req = ResolvedRequest::new(HttpMethod::Get, "https://a.com/x");
        req.set_header("X-Team", "core");
        let info = RequestInfo::from_request(&req);
        TracingObserver::new(LogOptions::default()).response(
            500,
            &info,
            &serde_json::json!({"reason": "boom"}),
        );
        assert!(logs_contain("Headers {\"X-Team\":\"core\"}"));
        assert!(logs_contain("Body {\"reason\":\"boom\"}"));
    }
}
