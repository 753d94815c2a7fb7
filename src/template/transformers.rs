//! Named value transformers.
//!
//! Config documents can reference these by name through `[[name]]` mapper
//! placeholders (see `ServiceManager`). Custom transformers are merged over
//! the builtin ones; unknown names fall back to `default`.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A pure value-to-value transform.
pub type ValueTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Registry of named value transformers.
#[derive(Clone)]
pub struct ValueTransformers {
    entries: HashMap<String, ValueTransform>,
}

impl fmt::Debug for ValueTransformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ValueTransformers")
            .field("names", &names)
            .finish()
    }
}

impl Default for ValueTransformers {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ValueTransformers {
    pub const DEFAULT: &'static str = "default";

    /// `json`, `arrayToCSV`, `csvToArray` and `default`.
    pub fn builtin() -> Self {
        let mut entries: HashMap<String, ValueTransform> = HashMap::new();
        entries.insert("json".into(), Arc::new(json));
        entries.insert("arrayToCSV".into(), Arc::new(array_to_csv));
        entries.insert("csvToArray".into(), Arc::new(csv_to_array));
        entries.insert(Self::DEFAULT.into(), Arc::new(|v: Value| v));
        Self { entries }
    }

    /// Registry without any entries.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register (or replace) a transformer.
    pub fn insert<F>(&mut self, name: impl Into<String>, transform: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(transform));
    }

    /// Merge `other` over `self`; entries in `other` win.
    pub fn extend(&mut self, other: ValueTransformers) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, name: &str) -> Option<ValueTransform> {
        self.entries.get(name).cloned()
    }

    /// Transformer registered under `name`, or the `default` one.
    pub fn get_or_default(&self, name: &str) -> ValueTransform {
        self.get(name)
            .or_else(|| self.get(Self::DEFAULT))
            .unwrap_or_else(|| Arc::new(|v: Value| v))
    }
}

fn json(value: Value) -> Value {
    Value::String(value.to_string())
}

fn array_to_csv(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Null => Value::String(String::new()),
        other => other,
    }
}

fn csv_to_array(value: Value) -> Value {
    match value {
        Value::String(s) => Value::Array(
            s.split(',')
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        Value::Null => Value::Array(vec![Value::String(String::new())]),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_transformers() {
        let t = ValueTransformers::builtin();
        assert_eq!(t.get_or_default("json")(json!({"a": 1})), json!("{\"a\":1}"));
        assert_eq!(t.get_or_default("arrayToCSV")(json!(["a", 1, "c"])), json!("a,1,c"));
        assert_eq!(t.get_or_default("csvToArray")(json!("a,b")), json!(["a", "b"]));
        assert_eq!(t.get_or_default("missing")(json!(5)), json!(5));
    }

    #[test]
    fn custom_transformers_override_builtin() {
        let mut t = ValueTransformers::builtin();
        let mut custom = ValueTransformers::empty();
        custom.insert("json", |_| json!("overridden"));
        t.extend(custom);
        assert_eq!(t.get_or_default("json")(json!(1)), json!("overridden"));
    }
}
