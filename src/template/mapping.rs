//! Default `{{path}}` template resolver.

use super::{ResolveOptions, TemplateResolver, ValueTransform};
use crate::error::{Result, ServiceError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid"));

static WHOLE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").expect("placeholder pattern is valid")
});

/// Maps the captures of a mapper pattern to a transform applied to the
/// looked-up value. Returning `None` makes the placeholder fail to resolve.
pub type MapperFn = Arc<dyn Fn(&Captures<'_>) -> Option<ValueTransform> + Send + Sync>;

/// Resolver for `{{path.to.value}}` placeholders.
///
/// - A string that is exactly one placeholder resolves to the referenced
///   value with its JSON type preserved (or undefined when missing).
/// - Placeholders embedded in a longer string are interpolated as text.
/// - Objects and arrays are resolved recursively; undefined object members
///   are dropped, undefined array items become `null`.
///
/// Mappers are `(pattern, fn)` pairs matched against a placeholder body. The
/// matched text is removed from the body, the remainder is used as the path
/// and the transform returned by `fn` is applied to the looked-up value, so
/// `{{tags [[arrayToCSV]]}}` joins `data.tags` with commas when a mapper for
/// `\[\[(.+?)]]` is registered.
#[derive(Clone, Default)]
pub struct MappingResolver {
    mappers: Vec<(Regex, MapperFn)>,
}

impl fmt::Debug for MappingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingResolver")
            .field(
                "mappers",
                &self.mappers.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MappingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapper for placeholder bodies matching `pattern`.
    pub fn with_mapper<F>(mut self, pattern: &str, mapper: F) -> Result<Self>
    where
        F: Fn(&Captures<'_>) -> Option<ValueTransform> + Send + Sync + 'static,
    {
        let regex = Regex::new(pattern)?;
        self.mappers.push((regex, Arc::new(mapper)));
        Ok(self)
    }

    fn resolve_placeholder(&self, body: &str, data: &Value) -> Result<Option<Value>> {
        let mut path = body.trim().to_string();
        let mut transform = None;
        for (pattern, mapper) in &self.mappers {
            let Some(caps) = pattern.captures(body) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            transform = Some(mapper(&caps).ok_or_else(|| {
                ServiceError::TemplateError(format!("no mapping for placeholder '{body}'"))
            })?);
            path = format!("{}{}", &body[..whole.start()], &body[whole.end()..])
                .trim()
                .to_string();
            break;
        }
        let value = lookup(data, &path).cloned();
        Ok(match (value, transform) {
            (Some(v), Some(transform)) => Some(transform(v)),
            (value, _) => value,
        })
    }

    fn resolve_str(
        &self,
        template: &str,
        data: &Value,
        options: &ResolveOptions,
    ) -> Result<Option<Value>> {
        if let Some(caps) = WHOLE_PLACEHOLDER.captures(template) {
            return Ok(match self.resolve_placeholder(&caps[1], data)? {
                Some(value) => Some(value),
                None if options.ignore_undefined => Some(Value::String(template.to_string())),
                None => options.replace_undefined_with.clone().map(Value::String),
            });
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            match self.resolve_placeholder(&caps[1], data)? {
                Some(value) => out.push_str(&stringify(&value)),
                None if options.ignore_undefined => out.push_str(whole.as_str()),
                None => out.push_str(options.replace_undefined_with.as_deref().unwrap_or("")),
            }
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(Some(Value::String(out)))
    }
}

impl TemplateResolver for MappingResolver {
    fn resolve(
        &self,
        template: &Value,
        data: &Value,
        options: &ResolveOptions,
    ) -> Result<Option<Value>> {
        match template {
            Value::String(s) => self.resolve_str(s, data, options),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    if let Some(v) = self.resolve(value, data, options)? {
                        resolved.insert(key.clone(), v);
                    }
                }
                Ok(Some(Value::Object(resolved)))
            }
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(self.resolve(item, data, options)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(resolved)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    fn has_any_mapping(&self, template: &Value) -> bool {
        match template {
            Value::String(s) => PLACEHOLDER.is_match(s),
            Value::Object(map) => map.values().any(|v| self.has_any_mapping(v)),
            Value::Array(items) => items.iter().any(|v| self.has_any_mapping(v)),
            _ => false,
        }
    }
}

/// Look up a dotted path (`a.b.0`, `a.b[0]`) in `data`. An empty path or
/// `$` refers to `data` itself.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() || path == "$" {
        return Some(data);
    }
    let normalized = path.replace('[', ".").replace(']', "");
    let mut current = data;
    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text form of a resolved value: strings verbatim, everything else as JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_placeholder_keeps_type() {
        let r = MappingResolver::new();
        let data = json!({"user": {"id": 7, "tags": ["a", "b"]}});
        let v = r
            .resolve(&json!("{{user.id}}"), &data, &ResolveOptions::default())
            .unwrap();
        assert_eq!(v, Some(json!(7)));
        let v = r
            .resolve(&json!("{{ user.tags[1] }}"), &data, &ResolveOptions::default())
            .unwrap();
        assert_eq!(v, Some(json!("b")));
    }

    #[test]
    fn missing_whole_placeholder_is_undefined() {
        let r = MappingResolver::new();
        let v = r
            .resolve(&json!("{{nope}}"), &json!({}), &ResolveOptions::default())
            .unwrap();
        assert_eq!(v, None);
    }

    #[test]
    fn interpolation_uses_replacement_for_undefined() {
        let r = MappingResolver::new();
        let v = r
            .resolve(
                &json!("http://a.com/users/{{id}}/posts"),
                &json!({}),
                &ResolveOptions::replace_undefined_with(""),
            )
            .unwrap();
        assert_eq!(v, Some(json!("http://a.com/users//posts")));
    }

    #[test]
    fn ignore_undefined_keeps_placeholders() {
        let r = MappingResolver::new();
        let template = json!({"a": "{{x}}", "b": "id-{{y}}", "c": "{{z}}"});
        let v = r
            .resolve(&template, &json!({"z": 1}), &ResolveOptions::ignore_undefined())
            .unwrap();
        assert_eq!(v, Some(json!({"a": "{{x}}", "b": "id-{{y}}", "c": 1})));
    }

    #[test]
    fn objects_drop_undefined_members() {
        let r = MappingResolver::new();
        let v = r
            .resolve(
                &json!({"a": "{{a}}", "b": "{{b}}", "fixed": true}),
                &json!({"a": "x"}),
                &ResolveOptions::default(),
            )
            .unwrap();
        assert_eq!(v, Some(json!({"a": "x", "fixed": true})));
    }

    #[test]
    fn mapper_transforms_value() {
        let r = MappingResolver::new()
            .with_mapper(r"\[\[(.+?)]]", |caps| {
                let name = caps.get(1)?.as_str().to_string();
                (name == "upper").then(|| {
                    Arc::new(|v: Value| Value::String(stringify(&v).to_uppercase()))
                        as ValueTransform
                })
            })
            .unwrap();
        let data = json!({"name": "bob"});
        let v = r
            .resolve(&json!("{{name [[upper]]}}"), &data, &ResolveOptions::default())
            .unwrap();
        assert_eq!(v, Some(json!("BOB")));
        let err = r
            .resolve(&json!("{{name [[nope]]}}"), &data, &ResolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::TemplateError(_)));
    }

    #[test]
    fn detects_mappings() {
        let r = MappingResolver::new();
        assert!(r.has_any_mapping(&json!({"h": ["x", "{{token}}"]})));
        assert!(!r.has_any_mapping(&json!({"h": "plain"})));
    }
}
