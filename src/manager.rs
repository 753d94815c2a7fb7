//! Service manager
//!
//! Owns a [`Services`] tree built from either a static config document or a
//! stream of documents. Before building, each document is resolved against
//! init data exposed under a reserved key (`__init__` by default), so a
//! config can embed values such as `{{__init__.apiHost}}`. Placeholders that
//! do not resolve are kept verbatim for send time. `[[name]]` inside a
//! placeholder selects a named value transformer, e.g.
//! `{{__init__.regions [[arrayToCSV]]}}`.
//!
//! With a stream, every new non-null document rebuilds the tree in place and
//! readers obtain the current tree through [`ServiceManager::services`].

use crate::defaults;
use crate::error::{Result, ServiceError};
use crate::services::{ServiceTree, Services, ServicesOptions};
use crate::template::{MappingResolver, ResolveOptions, TemplateResolver, ValueTransformers};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TRANSFORMER_MAPPER: &str = r"\[\[(.+?)]]";

/// Where service config documents come from.
#[derive(Debug)]
pub enum ConfigSource {
    Document(Value),
    /// Latest document; `None` means "no configuration available".
    Stream(watch::Receiver<Option<Value>>),
}

/// Builds and keeps the current service tree.
#[derive(Debug)]
pub struct ServiceManager {
    source: Option<ConfigSource>,
    init_key: String,
    init_data: Map<String, Value>,
    transformers: ValueTransformers,
    options: ServicesOptions,
    services: Arc<RwLock<Services>>,
    watcher: Option<JoinHandle<()>>,
}

impl ServiceManager {
    /// Manager for a static config document, which must be a JSON object.
    pub fn from_config(config: Value) -> Result<Self> {
        if !config.is_object() {
            return Err(ServiceError::ConfigurationError(
                "service configuration must be a JSON object".to_string(),
            ));
        }
        Ok(Self::with_source(ConfigSource::Document(config)))
    }

    /// Manager following a stream of config documents.
    pub fn from_stream(updates: watch::Receiver<Option<Value>>) -> Self {
        Self::with_source(ConfigSource::Stream(updates))
    }

    fn with_source(source: ConfigSource) -> Self {
        Self {
            source: Some(source),
            init_key: defaults::manager::INIT_KEY.to_string(),
            init_data: Map::new(),
            transformers: ValueTransformers::builtin(),
            options: ServicesOptions::default(),
            services: Arc::new(RwLock::new(Services::default())),
            watcher: None,
        }
    }

    pub fn with_init_key(mut self, key: impl Into<String>) -> Self {
        self.init_key = key.into();
        self
    }

    /// Values exposed under the init key while resolving config documents.
    pub fn with_init_data(mut self, data: Map<String, Value>) -> Self {
        self.init_data = data;
        self
    }

    /// Register a value transformer, replacing a builtin of the same name.
    pub fn with_transformer<F>(mut self, name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transformers.insert(name, transform);
        self
    }

    pub fn with_transformers(mut self, transformers: ValueTransformers) -> Self {
        self.transformers.extend(transformers);
        self
    }

    pub fn with_options(mut self, options: ServicesOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the first tree. With a stream this also starts following
    /// updates; it fails when the stream holds no configuration yet.
    pub async fn init(&mut self) -> Result<()> {
        let source = self.source.take().ok_or_else(|| {
            ServiceError::UnsupportedOperation("service manager is already initialized".to_string())
        })?;
        let builder = Arc::new(self.tree_builder()?);

        match source {
            ConfigSource::Document(config) => {
                let services = builder.build(&config)?;
                store(&self.services, services);
            }
            ConfigSource::Stream(mut updates) => {
                let first = updates.borrow_and_update().clone();
                let Some(config) = first.filter(|c| !c.is_null()) else {
                    return Err(ServiceError::ConfigurationError(
                        "No service configuration found to initialize services.".to_string(),
                    ));
                };
                let services = builder.build(&config)?;
                store(&self.services, services);

                let shared = self.services.clone();
                self.watcher = Some(tokio::spawn(async move {
                    while updates.changed().await.is_ok() {
                        let next = updates.borrow_and_update().clone();
                        let Some(config) = next.filter(|c| !c.is_null()) else {
                            tracing::warn!(target: "servicetree::services", "received empty service configuration, keeping current services");
                            continue;
                        };
                        match builder.build(&config) {
                            Ok(services) => store(&shared, services),
                            Err(e) => {
                                tracing::error!(target: "servicetree::services", err = %e, "failed to rebuild services, keeping current services");
                            }
                        }
                    }
                }));
            }
        }
        Ok(())
    }

    /// Current tree (empty before `init`).
    pub fn services(&self) -> Services {
        self.services
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn tree_builder(&self) -> Result<TreeBuilder> {
        let transformers = self.transformers.clone();
        let resolver = MappingResolver::new().with_mapper(TRANSFORMER_MAPPER, move |caps| {
            let name = caps.get(1).map_or(ValueTransformers::DEFAULT, |m| m.as_str().trim());
            Some(transformers.get_or_default(name))
        })?;
        let resolver: Arc<dyn TemplateResolver> = Arc::new(resolver);

        let mut options = self.options.clone();
        if options.resolver.is_none() {
            options.resolver = Some(resolver.clone());
        }

        let mut init = Map::new();
        init.insert(self.init_key.clone(), Value::Object(self.init_data.clone()));
        Ok(TreeBuilder {
            resolver,
            init: Value::Object(init),
            options,
        })
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

struct TreeBuilder {
    resolver: Arc<dyn TemplateResolver>,
    init: Value,
    options: ServicesOptions,
}

impl TreeBuilder {
    fn build(&self, config: &Value) -> Result<Services> {
        let resolved = self
            .resolver
            .resolve(config, &self.init, &ResolveOptions::ignore_undefined())?
            .unwrap_or(Value::Null);
        let services = ServiceTree::build(resolved, self.options.clone())?;
        tracing::info!(target: "servicetree::services", resources = services.len(), "Services config updated");
        tracing::debug!(target: "servicetree::services", config = %config, "service configuration");
        Ok(services)
    }
}

fn store(slot: &RwLock<Services>, services: Services) {
    *slot.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = services;
}
