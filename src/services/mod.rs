//! Service tree construction
//!
//! [`ServiceTree`] merges the config document layer by layer
//! (root -> resource -> service) and produces [`Services`]: one
//! [`ServiceFactory`] per declared service. A factory resolves nothing; it
//! creates a fresh [`Executor`] on every call so that per-call options can
//! differ without re-parsing the tree.
//!
//! Merging rules:
//! - paths: a segment starting with `/` replaces the prefix, anything else
//!   is appended to it
//! - host: the deeper layer wins
//! - headers: shallow merge, deeper layer wins key by key; a service may
//!   instead declare a header template, resolved per send and merged over
//!   the static headers
//! - query: see [`QuerySpec::merged_with`](crate::config::QuerySpec::merged_with)
//!
//! Resources without `get`, `save` or `delete` services receive synthesized
//! ones that GET, POST or DELETE the resource path, sending the trigger
//! data as the body of write methods.

mod options;

pub use options::{ExecutorOptions, ServicesOptions};

use crate::cache::ResponseCache;
use crate::config::{HeaderSpec, ServiceConfig, ServiceTreeConfig, ServiceType};
use crate::error::{Result, ServiceError};
use crate::execution::{Executor, RequestPlugin, Transformers};
use crate::observability::{LogOptions, RequestObserver, TracingObserver};
use crate::template::{MappingResolver, TemplateResolver};
use crate::transport::Transport;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const SYNTHESIZED: [(&str, &str); 3] = [("get", "get"), ("save", "post"), ("delete", "delete")];

/// Builds [`Services`] from a config document and global options.
#[derive(Debug)]
pub struct ServiceTree {
    config: ServiceTreeConfig,
    options: ServicesOptions,
    context: Arc<TreeContext>,
    services: Services,
}

impl ServiceTree {
    /// Validate `options` and prepare a tree. Call [`ServiceTree::generate`]
    /// to create the factories.
    pub fn new(config: ServiceTreeConfig, options: ServicesOptions) -> Result<Self> {
        let context = Arc::new(TreeContext::from_options(&options, None)?);
        Ok(Self {
            config,
            options,
            context,
            services: Services::default(),
        })
    }

    pub fn from_value(config: Value, options: ServicesOptions) -> Result<Self> {
        Self::new(ServiceTreeConfig::from_value(config)?, options)
    }

    /// Parse, validate and generate in one step.
    pub fn build(config: Value, options: ServicesOptions) -> Result<Services> {
        let mut tree = Self::from_value(config, options)?;
        Ok(tree.generate().clone())
    }

    pub fn options(&self) -> &ServicesOptions {
        &self.options
    }

    pub fn config(&self) -> &ServiceTreeConfig {
        &self.config
    }

    /// The cache shared by every executor of this tree.
    pub fn cache(&self) -> Arc<ResponseCache> {
        self.context.cache.clone()
    }

    /// Replace the global options. Factories generated afterwards use them;
    /// the tree's cache is kept unless `options` supplies a different one or
    /// changes its scope.
    pub fn set_options(&mut self, options: ServicesOptions) -> Result<()> {
        self.context = Arc::new(TreeContext::from_options(&options, Some(&self.context.cache))?);
        self.options = options;
        Ok(())
    }

    /// Change individual options in place, validating the result.
    pub fn update_options<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(&mut ServicesOptions),
    {
        let mut proposed = self.options.clone();
        update(&mut proposed);
        self.set_options(proposed)
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Merge the layers and (re)create every factory.
    pub fn generate(&mut self) -> &Services {
        let config = &self.config;
        let root_path = join_path("", config.path.as_deref(), "/");
        let root_host = config.host.clone().unwrap_or_default();
        let root_headers = layer_headers(&Map::new(), config.headers.as_ref(), "root");
        let root_query = config.query.clone().unwrap_or_default();

        let mut resources = BTreeMap::new();
        for (resource_name, resource) in &config.resources {
            let resource_path = join_path(&root_path, resource.path.as_deref(), "");
            let resource_host = resource.host.clone().unwrap_or_else(|| root_host.clone());
            let resource_headers =
                layer_headers(&root_headers, resource.headers.as_ref(), resource_name);
            let resource_query = root_query.merged_with(resource.query.as_ref());

            let mut factories = BTreeMap::new();
            for (service_name, declared) in resource.services.iter().flatten() {
                let config_path = format!("{resource_name}.{service_name}");
                let service_path = join_path(&resource_path, declared.path.as_deref(), "");
                let mut service = declared.clone();
                service.host = Some(declared.host.clone().unwrap_or_else(|| resource_host.clone()));
                let (headers, header_template) = self.service_headers(
                    &resource_headers,
                    declared,
                    &config_path,
                );
                service.headers = Some(HeaderSpec::Mapping(headers));
                service.header_template = header_template;
                service.query = Some(resource_query.merged_with(declared.query.as_ref()));
                factories.insert(
                    service_name.clone(),
                    ServiceFactory::new(config_path, service_path, service, self.context.clone()),
                );
            }

            for (service_name, method) in SYNTHESIZED {
                if factories.contains_key(service_name) {
                    continue;
                }
                let service = ServiceConfig {
                    method: Some(Value::String(method.to_string())),
                    service_type: ServiceType::Auto,
                    host: Some(resource_host.clone()),
                    headers: Some(HeaderSpec::Mapping(resource_headers.clone())),
                    query: Some(resource_query.clone()),
                    ..ServiceConfig::default()
                };
                factories.insert(
                    service_name.to_string(),
                    ServiceFactory::new(
                        format!("{resource_name}.{service_name}"),
                        resource_path.clone(),
                        service,
                        self.context.clone(),
                    ),
                );
            }

            tracing::debug!(
                target: "servicetree::services",
                resource = %resource_name,
                path = %resource_path,
                services = factories.len(),
                "generated resource services"
            );
            resources.insert(resource_name.clone(), factories);
        }

        self.services = Services {
            resources: Arc::new(resources),
        };
        &self.services
    }

    /// Static headers plus the optional header template of a service.
    fn service_headers(
        &self,
        inherited: &Map<String, Value>,
        service: &ServiceConfig,
        config_path: &str,
    ) -> (Map<String, Value>, Option<Value>) {
        match &service.headers {
            Some(HeaderSpec::Template(template)) => {
                let template = Value::String(template.clone());
                if self.context.resolver.has_any_mapping(&template) {
                    (inherited.clone(), Some(template))
                } else {
                    tracing::warn!(
                        target: "servicetree::services",
                        service = config_path,
                        "header template has no placeholders, ignoring it"
                    );
                    (inherited.clone(), service.header_template.clone())
                }
            }
            other => (
                layer_headers(inherited, other.as_ref(), config_path),
                service.header_template.clone(),
            ),
        }
    }
}

/// `/segment` replaces the prefix, `segment` is appended, nothing adds `fallback`.
fn join_path(current: &str, segment: Option<&str>, fallback: &str) -> String {
    match segment.filter(|s| !s.is_empty()) {
        Some(segment) if segment.starts_with('/') => segment.to_string(),
        Some(segment) => format!("{current}/{segment}"),
        None => format!("{current}{fallback}"),
    }
}

fn layer_headers(
    inherited: &Map<String, Value>,
    layer: Option<&HeaderSpec>,
    layer_name: &str,
) -> Map<String, Value> {
    let mut merged = inherited.clone();
    match layer {
        Some(HeaderSpec::Mapping(headers)) => {
            merged.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(HeaderSpec::Template(_)) => {
            tracing::warn!(
                target: "servicetree::services",
                layer = layer_name,
                "header templates are only supported on services, ignoring"
            );
        }
        None => {}
    }
    merged
}

/// State shared by every factory of one generation.
struct TreeContext {
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    resolver: Arc<dyn TemplateResolver>,
    observer: Option<Arc<dyn RequestObserver>>,
    logs: LogOptions,
    plugins: Vec<Arc<dyn RequestPlugin>>,
    transformers: Transformers,
}

impl fmt::Debug for TreeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeContext")
            .field("transport", &self.transport.name())
            .field("cache", &self.cache)
            .field("logs", &self.logs)
            .field("plugins", &self.plugins.len())
            .field("transformers", &self.transformers)
            .finish()
    }
}

impl TreeContext {
    fn from_options(
        options: &ServicesOptions,
        previous_cache: Option<&Arc<ResponseCache>>,
    ) -> Result<Self> {
        let transport = match &options.custom_transport {
            Some(transport) => transport.clone(),
            None => options.transport.build(&options.http)?,
        };
        let cache = match (&options.cache, previous_cache) {
            (Some(cache), _) => cache.clone(),
            (None, Some(previous)) if previous.scope() == options.cache_scope => previous.clone(),
            (None, _) => Arc::new(ResponseCache::new(options.cache_scope)),
        };
        let resolver = match &options.resolver {
            Some(resolver) => resolver.clone(),
            None => Arc::new(MappingResolver::new()) as Arc<dyn TemplateResolver>,
        };
        Ok(Self {
            transport,
            cache,
            resolver,
            observer: options.observer.clone(),
            logs: options.logs.clone(),
            plugins: options.plugins.clone(),
            transformers: options.transformers.clone(),
        })
    }
}

/// Creates executors for one declared (or synthesized) service.
#[derive(Clone)]
pub struct ServiceFactory {
    config_path: String,
    service_path: String,
    service: Arc<ServiceConfig>,
    context: Arc<TreeContext>,
}

impl fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("config_path", &self.config_path)
            .field("service_path", &self.service_path)
            .field("service", &self.service)
            .finish()
    }
}

impl ServiceFactory {
    fn new(
        config_path: String,
        service_path: String,
        service: ServiceConfig,
        context: Arc<TreeContext>,
    ) -> Self {
        Self {
            config_path,
            service_path,
            service: Arc::new(service),
            context,
        }
    }

    /// New executor with `options` layered over the global options.
    pub fn create(&self, options: ExecutorOptions) -> Executor {
        let ctx = &self.context;
        let observer: Arc<dyn RequestObserver> = match &ctx.observer {
            Some(observer) => observer.clone(),
            None => Arc::new(TracingObserver::new(ctx.logs.merged_with(&options.logs))),
        };
        let transport = options.transport.unwrap_or_else(|| ctx.transport.clone());
        Executor::new(
            self.config_path.clone(),
            self.service_path.clone(),
            self.service.clone(),
            transport,
        )
        .with_resolver(ctx.resolver.clone())
        .with_cache(ctx.cache.clone())
        .with_observer(observer)
        .with_plugins(ctx.plugins.iter().cloned().chain(options.plugins))
        .with_transformers(ctx.transformers.overridden_by(&options.transformers))
    }

    /// Executor with the global options only.
    pub fn executor(&self) -> Executor {
        self.create(ExecutorOptions::default())
    }

    /// `resource.service`, the prefix of every cache key.
    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// Merged service definition.
    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// Key for external state hooks; not acted upon here.
    pub fn store_key(&self) -> Option<&str> {
        self.service.store_key.as_deref()
    }
}

/// Generated factories, by resource then service name. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Services {
    resources: Arc<BTreeMap<String, BTreeMap<String, ServiceFactory>>>,
}

impl Services {
    pub fn resource(&self, name: &str) -> Option<&BTreeMap<String, ServiceFactory>> {
        self.resources.get(name)
    }

    pub fn get(&self, resource: &str, service: &str) -> Option<&ServiceFactory> {
        self.resources.get(resource)?.get(service)
    }

    /// Executor for `resource.service` with the global options.
    pub fn executor(&self, resource: &str, service: &str) -> Result<Executor> {
        self.get(resource, service)
            .map(ServiceFactory::executor)
            .ok_or_else(|| {
                ServiceError::InvalidArgument(format!("Unknown service '{resource}.{service}'"))
            })
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
