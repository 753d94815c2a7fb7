//! Template resolution boundary
//!
//! Executors never interpret placeholder syntax themselves. They hand a
//! template value (string, object or array) and the trigger data to a
//! [`TemplateResolver`] and receive a concrete value back. `None` stands for
//! an undefined result, which callers treat differently from JSON `null`
//! (undefined query keys are omitted, undefined form fields become empty
//! strings, and so on).
//!
//! The crate ships [`MappingResolver`], a `{{path}}` resolver with pluggable
//! `[[name]]` style mappers, but any implementation can be injected through
//! the service options.

mod mapping;
pub mod transformers;

pub use mapping::{MapperFn, MappingResolver};
pub(crate) use mapping::stringify;
pub use transformers::{ValueTransform, ValueTransformers};

use crate::error::Result;
use serde_json::Value;

/// Per-call resolution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Text substituted for undefined placeholders embedded in a larger
    /// string. Used for URLs so that no literal "undefined" ends up in a path.
    pub replace_undefined_with: Option<String>,
    /// Leave placeholders that cannot be resolved untouched instead of
    /// dropping them. Used when pre-resolving a config document so runtime
    /// placeholders survive until send time.
    pub ignore_undefined: bool,
}

impl ResolveOptions {
    pub fn replace_undefined_with(value: impl Into<String>) -> Self {
        Self {
            replace_undefined_with: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn ignore_undefined() -> Self {
        Self {
            ignore_undefined: true,
            ..Default::default()
        }
    }
}

/// Resolves templates against runtime data.
pub trait TemplateResolver: Send + Sync {
    /// Resolve `template` against `data`. `Ok(None)` means undefined.
    fn resolve(
        &self,
        template: &Value,
        data: &Value,
        options: &ResolveOptions,
    ) -> Result<Option<Value>>;

    /// Whether `template` contains at least one placeholder.
    fn has_any_mapping(&self, template: &Value) -> bool;
}
