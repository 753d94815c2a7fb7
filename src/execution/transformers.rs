//! Input and response transformers installed on executors.

use crate::error::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Applied to the trigger data before any template is resolved. May be async.
pub type InputTransformer = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Applied to a successfully parsed response body.
pub type ResponseTransformer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Which slot a [`Transformer`] occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Input,
    Response,
}

/// A transformer to install through `Executor::transform`.
#[derive(Clone)]
pub enum Transformer {
    Input(InputTransformer),
    Response(ResponseTransformer),
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transformer::{:?}", self.kind())
    }
}

impl Transformer {
    /// Synchronous input transformer.
    pub fn input<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::Input(Arc::new(move |value: Value| -> BoxFuture<'static, Result<Value>> {
            let out = f(value);
            async move { Ok(out) }.boxed()
        }))
    }

    /// Deferred input transformer.
    pub fn input_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::Input(Arc::new(move |value: Value| f(value).boxed()))
    }

    pub fn response<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::Response(Arc::new(f))
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Self::Input(_) => TransformKind::Input,
            Self::Response(_) => TransformKind::Response,
        }
    }
}

/// Input/response transformer pair carried by global and per-call options.
#[derive(Clone, Default)]
pub struct Transformers {
    pub input: Option<InputTransformer>,
    pub response: Option<ResponseTransformer>,
}

impl fmt::Debug for Transformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformers")
            .field("input", &self.input.is_some())
            .field("response", &self.response.is_some())
            .finish()
    }
}

impl Transformers {
    pub fn with(mut self, transformer: Transformer) -> Self {
        match transformer {
            Transformer::Input(t) => self.input = Some(t),
            Transformer::Response(t) => self.response = Some(t),
        }
        self
    }

    /// Per-slot override: entries set on `overrides` win.
    pub fn overridden_by(&self, overrides: &Transformers) -> Transformers {
        Transformers {
            input: overrides.input.clone().or_else(|| self.input.clone()),
            response: overrides.response.clone().or_else(|| self.response.clone()),
        }
    }
}
