//! servicetree
//!
//! Turns a declarative service-definition document (hosts, resource paths,
//! per-service method/header/query/body templates) into a tree of request
//! executors. Executors resolve their templates against runtime data,
//! dispatch over a pluggable transport, cache results (or the in-flight
//! request) per cache key and report progress to registered listeners.
//!
//! ```rust,ignore
//! use servicetree::prelude::*;
//! use serde_json::json;
//!
//! let services = ServiceTree::build(
//!     json!({
//!         "host": "https://api.example.com",
//!         "resources": {
//!             "users": {"path": "users", "services": {"byId": {"path": "{{id}}"}}}
//!         }
//!     }),
//!     ServicesOptions::default(),
//! )?;
//! let user = services
//!     .executor("users", "byId")?
//!     .cache(Some("by-id"))
//!     .send(json!({"id": 7}))
//!     .await?;
//! ```
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod execution;
pub mod manager;
pub mod observability;
pub mod services;
pub mod template;
pub mod transport;
pub mod utils;

pub use error::{Result, ServiceError};

pub mod prelude {
    pub use crate::cache::{CacheScope, ResponseCache};
    pub use crate::config::{ServiceConfig, ServiceTreeConfig};
    pub use crate::error::{ErrorCategory, Result, ServiceError};
    pub use crate::execution::{
        Event, EventHandler, EventKind, Executor, HeaderPlugin, HttpMethod, ProgressEvent,
        RequestPlugin, ResolvedRequest, Transformer,
    };
    pub use crate::manager::{ConfigSource, ServiceManager};
    pub use crate::observability::{LogFormat, LogOptions, RequestObserver, TracingObserver};
    pub use crate::services::{
        ExecutorOptions, ServiceFactory, ServiceTree, Services, ServicesOptions,
    };
    pub use crate::template::{MappingResolver, TemplateResolver, ValueTransformers};
    pub use crate::transport::{
        BuilderTransport, FetchTransport, HttpConfig, Transport, TransportKind,
    };
}
