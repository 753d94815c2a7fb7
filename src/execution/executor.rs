//! The request executor
//!
//! An [`Executor`] is created per call site from a service factory. It holds
//! the merged service definition plus per-instance options, and turns
//! trigger data into a response through [`Executor::send`]:
//!
//! 1. cache lookup (pending entries are joined, settled ones replayed)
//! 2. input transformer
//! 3. resolution of method, URL, query, headers and body
//! 4. plugins
//! 5. dispatch on the transport, observed by the [`RequestObserver`]
//! 6. response transformer
//!
//! When caching is enabled the pending outcome is stored before the request
//! starts, so concurrent sends with the same key share one network call.

use super::body::FieldFilter;
use super::events::{EventHandler, EventHandlers, EventKind};
use super::plugin::RequestPlugin;
use super::resolve::ResolutionPlan;
use super::transformers::{Transformer, Transformers};
use crate::cache::ResponseCache;
use crate::config::ServiceConfig;
use crate::defaults;
use crate::error::{Result, ServiceError};
use crate::observability::{LogOptions, RequestInfo, RequestObserver, TracingObserver};
use crate::template::{MappingResolver, TemplateResolver};
use crate::transport::{DispatchContext, Transport};
use crate::utils::CancelHandle;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Callable request executor for one declared service.
#[derive(Clone)]
pub struct Executor {
    config_path: String,
    service_path: String,
    service: Arc<ServiceConfig>,
    resolver: Arc<dyn TemplateResolver>,
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    observer: Arc<dyn RequestObserver>,
    plugins: Vec<Arc<dyn RequestPlugin>>,
    transformers: Transformers,
    handlers: EventHandlers,
    include_fields: Vec<String>,
    avoid_fields: Vec<String>,
    override_url: Option<String>,
    force_secure: bool,
    cache_key: Option<String>,
    in_flight: Arc<Mutex<Option<CancelHandle>>>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("config_path", &self.config_path)
            .field("service_path", &self.service_path)
            .field("transport", &self.transport.name())
            .field("plugins", &self.plugins.len())
            .field("transformers", &self.transformers)
            .field("handlers", &self.handlers)
            .field("override_url", &self.override_url)
            .field("force_secure", &self.force_secure)
            .field("cache_key", &self.cache_key)
            .finish()
    }
}

impl Executor {
    /// Executor with the default resolver, a private cache and a
    /// [`TracingObserver`]. Service trees wire shared instances in instead.
    pub fn new(
        config_path: impl Into<String>,
        service_path: impl Into<String>,
        service: impl Into<Arc<ServiceConfig>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            service_path: service_path.into(),
            service: service.into(),
            resolver: Arc::new(MappingResolver::new()),
            transport,
            cache: Arc::new(ResponseCache::default()),
            observer: Arc::new(TracingObserver::new(LogOptions::default())),
            plugins: Vec::new(),
            transformers: Transformers::default(),
            handlers: EventHandlers::default(),
            include_fields: Vec::new(),
            avoid_fields: Vec::new(),
            override_url: None,
            force_secure: false,
            cache_key: None,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_plugins<I>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RequestPlugin>>,
    {
        self.plugins.extend(plugins);
        self
    }

    pub fn with_transformers(mut self, transformers: Transformers) -> Self {
        self.transformers = transformers;
        self
    }

    /// Enable caching. The effective key is `configPath:key`, or just the
    /// config path when no key (or an empty one) is given, so distinct
    /// services never collide.
    pub fn cache(mut self, key: Option<&str>) -> Self {
        self.cache_key = Some(match key {
            Some(key) if !key.is_empty() => format!(
                "{}{}{}",
                self.config_path,
                defaults::executor::CACHE_KEY_SEPARATOR,
                key
            ),
            _ => self.config_path.clone(),
        });
        self
    }

    /// Only serialize these body fields in form / URL-encoded mode.
    /// Takes precedence over [`Executor::avoid_fields`].
    pub fn include_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Skip these body fields in form / URL-encoded mode.
    pub fn avoid_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.avoid_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Use `url` verbatim instead of resolving `host + path`.
    pub fn override_url(mut self, url: &str) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "override URL must be a non-empty string".to_string(),
            ));
        }
        self.override_url = Some(url.to_string());
        Ok(self)
    }

    /// Rewrite the resolved URL's scheme to `https`.
    pub fn force_secure(mut self, secure: bool) -> Self {
        self.force_secure = secure;
        self
    }

    /// Install an input or response transformer, replacing one of the same kind.
    pub fn transform(mut self, transformer: Transformer) -> Self {
        self.transformers = std::mem::take(&mut self.transformers).with(transformer);
        self
    }

    /// Append a request-mutation hook.
    pub fn plugin<P>(mut self, plugin: P) -> Self
    where
        P: RequestPlugin + 'static,
    {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn on(mut self, kind: EventKind, handler: EventHandler) -> Self {
        self.handlers.on(kind, handler);
        self
    }

    /// Remove `handler`, or every listener of `kind` when `None`.
    pub fn off(mut self, kind: EventKind, handler: Option<&EventHandler>) -> Self {
        self.handlers.off(kind, handler);
        self
    }

    /// Cancel the in-flight dispatch, if the transport supports it.
    pub fn abort(&self) {
        if !self.transport.supports_abort() {
            tracing::debug!(
                target: "servicetree::http",
                transport = self.transport.name(),
                config_path = %self.config_path,
                "abort is not supported by this transport, ignoring"
            );
            return;
        }
        if let Some(handle) = self.in_flight().as_ref() {
            handle.cancel();
        }
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// Effective cache key, if caching is enabled.
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// Resolve `trigger` into a request, dispatch it and return the
    /// (transformed) response body.
    pub async fn send(&self, trigger: Value) -> Result<Value> {
        let Some(key) = self.cache_key.as_deref() else {
            return self.execute(trigger).await;
        };

        let storage_key = self.cache.storage_key(self.transport.name(), key);
        let entry = self.cache.get_or_start(&storage_key, || {
            let this = self.clone();
            let cache = self.cache.clone();
            let settle_key = storage_key.clone();
            async move {
                let outcome = this.execute(trigger).await;
                cache.settle(&settle_key, &outcome);
                outcome
            }
            .boxed()
            .shared()
        });
        entry.outcome().await
    }

    async fn execute(&self, trigger: Value) -> Result<Value> {
        let data = match &self.transformers.input {
            Some(transform) => transform(trigger).await?,
            None => trigger,
        };

        let mut request = ResolutionPlan {
            service_path: &self.service_path,
            service: &self.service,
            resolver: self.resolver.as_ref(),
            override_url: self.override_url.as_deref(),
            force_secure: self.force_secure,
            filter: FieldFilter::from_lists(&self.include_fields, &self.avoid_fields),
        }
        .resolve(&data)?;

        for plugin in &self.plugins {
            plugin.apply(&mut request);
        }

        let mut info = RequestInfo::from_request(&request);
        let started = request.started;
        self.observer.request(&info);

        let cancel = CancelHandle::new();
        *self.in_flight() = Some(cancel.clone());
        let ctx = DispatchContext {
            emitter: self.handlers.emitter(),
            cancel,
        };

        let outcome = self.transport.dispatch(request, &ctx).await;
        info.elapsed = started.elapsed();

        match outcome {
            Ok(response) => {
                self.observer.response(response.status, &info, &response.body);
                Ok(match &self.transformers.response {
                    Some(transform) => transform(response.body),
                    None => response.body,
                })
            }
            Err(err) => {
                self.observer.error(&err, &info);
                Err(err)
            }
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<CancelHandle>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
