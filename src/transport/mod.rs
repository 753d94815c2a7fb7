//! Network transports
//!
//! A [`Transport`] turns a fully [`ResolvedRequest`] into a response or a
//! failure. Two interchangeable strategies ship with the crate:
//!
//! - [`BuilderTransport`] drives `reqwest`'s fluent request builder (native
//!   query and multipart helpers).
//! - [`FetchTransport`] assembles an explicit `reqwest::Request` with a hand
//!   composed URL, instruments progress from the body stream and supports
//!   cancellation.
//!
//! Both classify responses the same way: bodies whose content type contains
//! `application/json` are parsed as JSON, everything else is returned as
//! text, and non-2xx statuses become [`ServiceError::ApiError`] carrying the
//! parsed body.

mod builder;
mod client;
mod fetch;

pub use builder::BuilderTransport;
pub use client::{HttpConfig, HttpConfigBuilder, build_http_client};
pub use fetch::FetchTransport;

use crate::error::{Result, ServiceError};
use crate::execution::{EventEmitter, ResolvedRequest};
use crate::utils::CancelHandle;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;

/// Settled response of a successful exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Per-dispatch context handed to the transport.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// Progress sink for this dispatch.
    pub emitter: EventEmitter,
    /// Cancelled by `Executor::abort`.
    pub cancel: CancelHandle,
}

/// "Send a resolved request and produce a response or failure".
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable name, also used to namespace per-transport cache entries.
    fn name(&self) -> &'static str;

    /// Whether `DispatchContext::cancel` is honoured.
    fn supports_abort(&self) -> bool {
        false
    }

    async fn dispatch(
        &self,
        request: ResolvedRequest,
        ctx: &DispatchContext,
    ) -> Result<TransportResponse>;
}

/// Built-in transport strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Builder,
    Fetch,
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Builder => builder::NAME,
            Self::Fetch => fetch::NAME,
        }
    }

    /// Instantiate the strategy with a client built from `config`.
    pub fn build(&self, config: &HttpConfig) -> Result<Arc<dyn Transport>> {
        let client = build_http_client(config)?;
        let transport: Arc<dyn Transport> = match self {
            Self::Builder => Arc::new(BuilderTransport::new(client)),
            Self::Fetch => Arc::new(FetchTransport::new(client)),
        };
        Ok(transport)
    }
}

/// Classify a response body by its content type.
pub fn parse_body(content_type: Option<&str>, bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes);
    let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
    if is_json {
        if text.trim().is_empty() {
            return Value::Null;
        }
        if let Ok(value) = serde_json::from_str(&text) {
            return value;
        }
        tracing::debug!(target: "servicetree::http", "response declared JSON but did not parse, keeping text");
    }
    Value::String(text.into_owned())
}

/// Largest up-front reservation for a buffered body. The declared
/// Content-Length is only a hint and larger bodies grow the buffer.
const MAX_BODY_RESERVATION: u64 = 64 * 1024;

pub(crate) fn body_buffer(declared: u64) -> Vec<u8> {
    Vec::with_capacity(declared.min(MAX_BODY_RESERVATION) as usize)
}

pub(crate) fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Settle a buffered response: 2xx succeeds, anything else is an `ApiError`.
pub(crate) fn classify(
    status: reqwest::StatusCode,
    headers: HeaderMap,
    bytes: &[u8],
) -> Result<TransportResponse> {
    let body = parse_body(content_type(&headers), bytes);
    if status.is_success() {
        return Ok(TransportResponse {
            status: status.as_u16(),
            headers,
            body,
        });
    }
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    Err(ServiceError::api_error(
        status.as_u16(),
        format!("HTTP {}: {reason}", status.as_u16()),
        Some(body),
    ))
}
