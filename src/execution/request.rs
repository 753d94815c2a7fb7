//! Concrete request produced by one `send` call.

use crate::error::{Result, ServiceError};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Instant;

/// HTTP verbs understood by the transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Case-insensitive parse. `del` is accepted as an alias of `delete`.
    pub fn parse(method: &str) -> Result<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" | "del" => Ok(Self::Delete),
            "head" => Ok(Self::Head),
            "options" => Ok(Self::Options),
            other => Err(ServiceError::InvalidArgument(format!(
                "Unsupported HTTP method '{other}'"
            ))),
        }
    }

    /// Methods that carry a request body.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Text(String),
    /// `key=value&...` with percent-encoded values.
    UrlEncoded(String),
    /// Multipart fields in insertion order.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Approximate payload size, used for upload progress reporting.
    pub fn len_hint(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Json(v) => v.to_string().len() as u64,
            Self::Text(s) | Self::UrlEncoded(s) => s.len() as u64,
            Self::Form(fields) => fields.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum(),
        }
    }

    /// JSON view of the body for observers and plugins.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Json(v) => Some(v.clone()),
            Self::Text(s) | Self::UrlEncoded(s) => Some(Value::String(s.clone())),
            Self::Form(fields) => {
                let mut map = Map::new();
                for (k, v) in fields {
                    map.insert(k.clone(), Value::String(v.clone()));
                }
                Some(Value::Object(map))
            }
        }
    }
}

/// Fully resolved request handed to plugins and then to the transport.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    /// Correlation id for logs.
    pub request_id: String,
    pub method: HttpMethod,
    /// Normalized URL without query string.
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub(crate) started: Instant,
}

impl ResolvedRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            started: Instant::now(),
        }
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value regardless of case.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Query value by name (first occurrence).
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// URL with the query string appended.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, encoded)
    }

    /// Time since the request was assembled.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}
