//! Body shaping: field filters, form fields and URL-encoded payloads.

use crate::template::stringify;
use serde_json::{Map, Value};

/// Which body fields are serialized when fields are encoded one by one
/// (multipart and form paths).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldFilter {
    #[default]
    All,
    Include(Vec<String>),
    Avoid(Vec<String>),
}

impl FieldFilter {
    /// `include` wins whenever it is non-empty.
    pub fn from_lists(include: &[String], avoid: &[String]) -> Self {
        if !include.is_empty() {
            Self::Include(include.to_vec())
        } else if !avoid.is_empty() {
            Self::Avoid(avoid.to_vec())
        } else {
            Self::All
        }
    }

    pub fn allows(&self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Include(fields) => fields.iter().any(|f| f == field),
            Self::Avoid(fields) => !fields.iter().any(|f| f == field),
        }
    }
}

/// Result of resolving a body template.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBody {
    Undefined,
    /// Object template resolved member by member; `None` marks an undefined member.
    Fields(Vec<(String, Option<Value>)>),
    Value(Value),
}

impl ResolvedBody {
    /// Drop undefined members. Non-object bodies are left untouched.
    pub fn without_undefined(self) -> Self {
        match self {
            Self::Fields(fields) => {
                Self::Fields(fields.into_iter().filter(|(_, v)| v.is_some()).collect())
            }
            other => other,
        }
    }

    /// Members for field-wise encodings. Resolved objects count as fields;
    /// scalars and undefined bodies yield none.
    fn fields(&self) -> Vec<(String, Option<Value>)> {
        match self {
            Self::Fields(fields) => fields.clone(),
            Self::Value(Value::Object(map)) => {
                map.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect()
            }
            _ => Vec::new(),
        }
    }

    /// JSON form of the body; undefined members are omitted.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Undefined => None,
            Self::Value(v) => Some(v),
            Self::Fields(fields) => {
                let mut map = Map::new();
                for (k, v) in fields {
                    if let Some(v) = v {
                        map.insert(k, v);
                    }
                }
                Some(Value::Object(map))
            }
        }
    }
}

/// Multipart fields. Arrays add one entry per element, other non-primitive
/// values are JSON encoded and undefined members become empty strings.
pub fn form_fields(body: &ResolvedBody, filter: &FieldFilter) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, value) in body.fields() {
        if !filter.allows(&name) {
            continue;
        }
        match value {
            Some(Value::Array(items)) => {
                for item in items {
                    out.push((name.clone(), stringify(&item)));
                }
            }
            Some(value) => out.push((name, stringify(&value))),
            None => out.push((name, String::new())),
        }
    }
    out
}

/// `key=value` pairs joined with `&`. Values are percent-encoded after
/// JSON-encoding anything that is not a string; arrays repeat the key.
pub fn url_encoded(body: &ResolvedBody) -> String {
    let mut pairs = Vec::new();
    for (name, value) in body.fields() {
        match value {
            Some(Value::Array(items)) => {
                for item in items {
                    pairs.push(format!("{name}={}", encode_value(&item)));
                }
            }
            Some(value) => pairs.push(format!("{name}={}", encode_value(&value))),
            None => pairs.push(format!("{name}=")),
        }
    }
    pairs.join("&")
}

fn encode_value(value: &Value) -> String {
    urlencoding::encode(&stringify(value)).into_owned()
}
