//! Global and per-call executor options

use crate::cache::{CacheScope, ResponseCache};
use crate::execution::{RequestPlugin, Transformer, Transformers};
use crate::observability::{LogOptions, RequestObserver};
use crate::template::TemplateResolver;
use crate::transport::{HttpConfig, Transport, TransportKind};
use std::fmt;
use std::sync::Arc;

/// Options shared by every executor of a service tree.
#[derive(Clone, Default)]
pub struct ServicesOptions {
    /// Run for every request before dispatch, ahead of per-call plugins.
    pub plugins: Vec<Arc<dyn RequestPlugin>>,
    pub logs: LogOptions,
    pub transformers: Transformers,
    /// Built-in transport used when `custom_transport` is unset.
    pub transport: TransportKind,
    pub custom_transport: Option<Arc<dyn Transport>>,
    pub http: HttpConfig,
    /// Scope of the cache created by the tree when `cache` is unset.
    pub cache_scope: CacheScope,
    pub cache: Option<Arc<ResponseCache>>,
    /// Defaults to a plain `MappingResolver`.
    pub resolver: Option<Arc<dyn TemplateResolver>>,
    /// Defaults to a `TracingObserver` built from the merged log options.
    pub observer: Option<Arc<dyn RequestObserver>>,
}

impl fmt::Debug for ServicesOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicesOptions")
            .field("plugins", &self.plugins.len())
            .field("logs", &self.logs)
            .field("transformers", &self.transformers)
            .field("transport", &self.transport)
            .field(
                "custom_transport",
                &self.custom_transport.as_ref().map(|t| t.name()),
            )
            .field("http", &self.http)
            .field("cache_scope", &self.cache_scope)
            .field("cache", &self.cache.is_some())
            .field("resolver", &self.resolver.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ServicesOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin<P>(mut self, plugin: P) -> Self
    where
        P: RequestPlugin + 'static,
    {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn with_logs(mut self, logs: LogOptions) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformers = self.transformers.with(transformer);
        self
    }

    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = kind;
        self
    }

    pub fn with_custom_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.custom_transport = Some(transport);
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_cache_scope(mut self, scope: CacheScope) -> Self {
        self.cache_scope = scope;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Options for one executor, layered over [`ServicesOptions`].
///
/// Log options merge key by key; each transformer slot set here replaces
/// the global one; plugins are appended after the global plugins.
#[derive(Clone, Default)]
pub struct ExecutorOptions {
    pub logs: LogOptions,
    pub transformers: Transformers,
    pub plugins: Vec<Arc<dyn RequestPlugin>>,
    pub transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for ExecutorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("logs", &self.logs)
            .field("transformers", &self.transformers)
            .field("plugins", &self.plugins.len())
            .field("transport", &self.transport.as_ref().map(|t| t.name()))
            .finish()
    }
}

impl ExecutorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logs(mut self, logs: LogOptions) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformers = self.transformers.with(transformer);
        self
    }

    pub fn with_plugin<P>(mut self, plugin: P) -> Self
    where
        P: RequestPlugin + 'static,
    {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }
}
