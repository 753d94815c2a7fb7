//! Service tree configuration document
//!
//! Serde model of the JSON document describing hosts, resources and
//! services:
//!
//! ```json
//! {
//!   "host": "https://api.example.com",
//!   "path": "v1",
//!   "headers": {"x-client": "web"},
//!   "resources": {
//!     "users": {
//!       "path": "users",
//!       "services": {
//!         "byId": {"path": "{{id}}", "method": "get"}
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Layer merging (root -> resource -> service) lives in `services`; this
//! module only describes shapes and the query merge rule.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Root of the config document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceTreeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QuerySpec>,
    /// Required; a document without resources is rejected.
    pub resources: BTreeMap<String, ResourceConfig>,
}

impl ServiceTreeConfig {
    /// Parse a config document, failing fast on malformed input.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ServiceError::ConfigurationError(format!("Invalid service config: {e}")))
    }
}

/// A resource: a path prefix grouping services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QuerySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, ServiceConfig>>,
}

/// How a write request derives its body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Send the (transformed) trigger data itself as the body of write methods.
    Auto,
    /// Send the resolved body template.
    #[default]
    #[serde(other)]
    Template,
}

/// A single callable service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// HTTP method, possibly a template resolved at send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Value>,
    #[serde(default, rename = "type")]
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSpec>,
    /// Header template resolved per send and merged over the static headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_template: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QuerySpec>,
    /// Body template.
    #[serde(default, alias = "body", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub is_form_data: bool,
    #[serde(default, rename = "isURLEncoded")]
    pub is_url_encoded: bool,
    #[serde(default)]
    pub delete_empty_fields: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_key: Option<String>,
}

/// Headers: a mapping, or (services only) a template resolving to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderSpec {
    Mapping(Map<String, Value>),
    Template(String),
}

/// Query: a mapping, a template resolving to one, or an ordered list of
/// fragments (produced when inherited layers disagree on shape) merged
/// left to right after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    Mapping(Map<String, Value>),
    Template(String),
    Composite(Vec<QuerySpec>),
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self::Mapping(Map::new())
    }
}

impl QuerySpec {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Mapping(map) => map.is_empty(),
            Self::Template(t) => t.is_empty(),
            Self::Composite(parts) => parts.iter().all(QuerySpec::is_empty),
        }
    }

    /// Inherit `self` into a child layer. Mappings merge shallowly with the
    /// child winning key by key; any other shape combination keeps both
    /// fragments in order.
    pub fn merged_with(&self, child: Option<&QuerySpec>) -> QuerySpec {
        let Some(child) = child else {
            return self.clone();
        };
        if self.is_empty() {
            return child.clone();
        }
        match (self, child) {
            (Self::Mapping(parent), Self::Mapping(overrides)) => {
                let mut merged = parent.clone();
                merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
                Self::Mapping(merged)
            }
            (Self::Composite(parts), child) => {
                let mut parts = parts.clone();
                parts.push(child.clone());
                Self::Composite(parts)
            }
            (parent, child) => Self::Composite(vec![parent.clone(), child.clone()]),
        }
    }
}
