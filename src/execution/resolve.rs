//! Request resolution pipeline
//!
//! Turns a service definition plus trigger data into a [`ResolvedRequest`].
//! The steps run in a fixed order: method, URL, query, headers, body. Header,
//! query and body templates are best effort: a failing template contributes
//! nothing instead of failing the request. Only the URL is mandatory.

use super::body::{FieldFilter, ResolvedBody, form_fields, url_encoded};
use super::request::{HttpMethod, RequestBody, ResolvedRequest};
use crate::config::{HeaderSpec, QuerySpec, ServiceConfig, ServiceType};
use crate::defaults;
use crate::error::{Result, ServiceError};
use crate::template::{ResolveOptions, TemplateResolver, stringify};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static REPEATED_SLASHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^:/])/+").expect("slash pattern is valid"));

static HTTP_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?").expect("scheme pattern is valid"));

/// Everything needed to resolve one request, borrowed from an executor.
pub(crate) struct ResolutionPlan<'a> {
    pub service_path: &'a str,
    pub service: &'a ServiceConfig,
    pub resolver: &'a dyn TemplateResolver,
    pub override_url: Option<&'a str>,
    pub force_secure: bool,
    pub filter: FieldFilter,
}

impl ResolutionPlan<'_> {
    pub fn resolve(&self, data: &Value) -> Result<ResolvedRequest> {
        let method = self.resolve_method(data)?;
        let url = self.resolve_url(data)?;
        let mut request = ResolvedRequest::new(method, url);
        request.query = query_pairs(self.resolve_query(data));
        request.headers = self.resolve_headers(data);
        self.attach_body(&mut request, data);
        Ok(request)
    }

    fn resolve_method(&self, data: &Value) -> Result<HttpMethod> {
        let template = self
            .service
            .method
            .clone()
            .unwrap_or_else(|| Value::String(defaults::executor::METHOD.to_string()));
        let resolved = match self
            .resolver
            .resolve(&template, data, &ResolveOptions::default())
        {
            Ok(Some(Value::String(method))) if !method.trim().is_empty() => method,
            Ok(_) => defaults::executor::METHOD.to_string(),
            Err(e) => {
                tracing::warn!(target: "servicetree::http", err=%e, "method template failed, using GET");
                defaults::executor::METHOD.to_string()
            }
        };
        HttpMethod::parse(&resolved)
    }

    fn resolve_url(&self, data: &Value) -> Result<String> {
        if let Some(url) = self.override_url {
            return Ok(normalize_url(url, self.force_secure));
        }
        let host = self.service.host.as_deref().unwrap_or_default();
        let template = Value::String(format!("{host}{}", self.service_path));
        let resolved = self
            .resolver
            .resolve(&template, data, &ResolveOptions::replace_undefined_with(""))
            .map_err(|e| ServiceError::TemplateError(format!("Failed to resolve URL: {e}")))?
            .map(|v| stringify(&v))
            .unwrap_or_default();
        Ok(normalize_url(&resolved, self.force_secure))
    }

    fn resolve_query(&self, data: &Value) -> Map<String, Value> {
        match &self.service.query {
            Some(spec) => resolve_query_spec(self.resolver, spec, data),
            None => Map::new(),
        }
    }

    fn resolve_headers(&self, data: &Value) -> Vec<(String, String)> {
        let (static_headers, template) = match &self.service.headers {
            Some(HeaderSpec::Mapping(map)) => (Some(map), self.service.header_template.clone()),
            Some(HeaderSpec::Template(t)) => (None, Some(Value::String(t.clone()))),
            None => (None, self.service.header_template.clone()),
        };

        let mut resolved = Map::new();
        if let Some(map) = static_headers {
            for (name, value) in map {
                match self.resolver.resolve(value, data, &ResolveOptions::default()) {
                    Ok(Some(v)) => {
                        resolved.insert(name.clone(), v);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(target: "servicetree::http", header=%name, err=%e, "header template failed, skipping");
                    }
                }
            }
        }
        if let Some(template) = template {
            match self.resolver.resolve(&template, data, &ResolveOptions::default()) {
                Ok(Some(Value::Object(extra))) => resolved.extend(extra),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(target: "servicetree::http", err=%e, "header template failed, keeping static headers");
                }
            }
        }

        let mut headers: Vec<(String, String)> = Vec::with_capacity(resolved.len());
        for (name, value) in resolved {
            if value.is_null() {
                continue;
            }
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
            headers.push((name, stringify(&value)));
        }
        headers
    }

    fn resolve_body(&self, data: &Value) -> ResolvedBody {
        let template = self
            .service
            .data
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let options = ResolveOptions::default();
        match &template {
            Value::Object(members) => ResolvedBody::Fields(
                members
                    .iter()
                    .map(|(name, member)| {
                        let value = self.resolver.resolve(member, data, &options).unwrap_or_else(|e| {
                            tracing::debug!(target: "servicetree::http", field=%name, err=%e, "body field template failed");
                            None
                        });
                        (name.clone(), value)
                    })
                    .collect(),
            ),
            _ => match self.resolver.resolve(&template, data, &options) {
                Ok(Some(v)) => ResolvedBody::Value(v),
                Ok(None) => ResolvedBody::Undefined,
                Err(e) => {
                    tracing::debug!(target: "servicetree::http", err=%e, "body template failed, sending no body");
                    ResolvedBody::Undefined
                }
            },
        }
    }

    fn attach_body(&self, request: &mut ResolvedRequest, data: &Value) {
        if data.is_null() {
            return;
        }
        let service = self.service;
        let mut resolved = self.resolve_body(data);
        if service.delete_empty_fields {
            resolved = resolved.without_undefined();
        }

        if service.is_form_data {
            request.body = RequestBody::Form(form_fields(&resolved, &self.filter));
        } else if service.is_url_encoded {
            request.body = RequestBody::UrlEncoded(url_encoded(&resolved));
            request.set_header("Content-Type", "application/x-www-form-urlencoded");
        } else if request.method.is_write() && service.service_type == ServiceType::Auto {
            request.body = RequestBody::Json(data.clone());
        } else if request.method.is_write() {
            request.body = match resolved.into_json() {
                None => RequestBody::Empty,
                Some(Value::String(text)) => RequestBody::Text(text),
                Some(value) => RequestBody::Json(value),
            };
        }

        if matches!(request.body, RequestBody::Json(_)) && request.header("content-type").is_none() {
            request.set_header("Content-Type", "application/json");
        }
    }
}

/// Collapse repeated slashes outside the scheme separator, drop a trailing
/// slash and optionally upgrade the scheme to https.
pub fn normalize_url(url: &str, force_secure: bool) -> String {
    let collapsed = REPEATED_SLASHES.replace_all(url, "$1/");
    let collapsed: &str = collapsed.as_ref();
    let mut normalized = collapsed.strip_suffix('/').unwrap_or(collapsed).to_string();
    if force_secure {
        normalized = HTTP_SCHEME.replace(&normalized, "https").into_owned();
    }
    normalized
}

/// Resolve a query spec into a mapping. Undefined values are omitted and
/// failing fragments contribute nothing.
pub(crate) fn resolve_query_spec(
    resolver: &dyn TemplateResolver,
    spec: &QuerySpec,
    data: &Value,
) -> Map<String, Value> {
    let options = ResolveOptions::default();
    match spec {
        QuerySpec::Mapping(map) => {
            let mut resolved = Map::new();
            for (key, template) in map {
                match resolver.resolve(template, data, &options) {
                    Ok(Some(value)) => {
                        resolved.insert(key.clone(), value);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(target: "servicetree::http", query=%key, err=%e, "query template failed, skipping");
                    }
                }
            }
            resolved
        }
        QuerySpec::Template(template) => {
            match resolver.resolve(&Value::String(template.clone()), data, &options) {
                Ok(Some(Value::Object(map))) => map,
                Ok(Some(Value::Array(parts))) => parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .fold(Map::new(), |mut acc, part| {
                        acc.extend(part);
                        acc
                    }),
                Ok(_) => Map::new(),
                Err(e) => {
                    tracing::debug!(target: "servicetree::http", err=%e, "query template failed, skipping");
                    Map::new()
                }
            }
        }
        QuerySpec::Composite(parts) => parts.iter().fold(Map::new(), |mut acc, part| {
            acc.extend(resolve_query_spec(resolver, part, data));
            acc
        }),
    }
}

/// Flatten a resolved query mapping into ordered pairs. Arrays repeat the key.
pub(crate) fn query_pairs(query: Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(query.len());
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_text(&item)));
                }
            }
            other => pairs.push((key, scalar_text(&other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => stringify(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MappingResolver;
    use serde_json::json;

    fn service(value: Value) -> ServiceConfig {
        serde_json::from_value(value).unwrap()
    }

    fn plan<'a>(
        path: &'a str,
        service: &'a ServiceConfig,
        resolver: &'a MappingResolver,
    ) -> ResolutionPlan<'a> {
        ResolutionPlan {
            service_path: path,
            service,
            resolver,
            override_url: None,
            force_secure: false,
            filter: FieldFilter::All,
        }
    }

    #[test]
    fn normalizes_slashes() {
        assert_eq!(normalize_url("http://a.com///users//", false), "http://a.com/users");
        assert_eq!(normalize_url("https://a.com/x//y/", false), "https://a.com/x/y");
        assert_eq!(normalize_url("http://a.com/x", true), "https://a.com/x");
        assert_eq!(normalize_url("https://a.com/x", true), "https://a.com/x");
    }

    #[test]
    fn resolves_url_with_missing_values_as_empty_segments() {
        let resolver = MappingResolver::new();
        let svc = service(json!({"host": "http://a.com/"}));
        let req = plan("//users//{{id}}/", &svc, &resolver)
            .resolve(&json!({}))
            .unwrap();
        assert_eq!(req.url, "http://a.com/users");
        let req = plan("//users//{{id}}/", &svc, &resolver)
            .resolve(&json!({"id": 42}))
            .unwrap();
        assert_eq!(req.url, "http://a.com/users/42");
    }

    #[test]
    fn omits_undefined_query_values() {
        let resolver = MappingResolver::new();
        let svc = service(json!({
            "host": "http://a.com",
            "query": {"page": "{{page}}", "size": "{{size}}", "fixed": "1"}
        }));
        let req = plan("/items", &svc, &resolver)
            .resolve(&json!({"page": 2}))
            .unwrap();
        assert_eq!(
            req.query,
            vec![("fixed".to_string(), "1".to_string()), ("page".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn composite_query_merges_left_to_right() {
        let resolver = MappingResolver::new();
        let svc = ServiceConfig {
            host: Some("http://a.com".into()),
            query: Some(QuerySpec::Composite(vec![
                QuerySpec::Mapping(json!({"a": "1", "b": "{{b}}"}).as_object().unwrap().clone()),
                QuerySpec::Template("{{extra}}".into()),
            ])),
            ..Default::default()
        };
        let req = plan("/q", &svc, &resolver)
            .resolve(&json!({"b": "x", "extra": {"b": "y", "c": [1, 2]}}))
            .unwrap();
        assert_eq!(req.query_value("a"), Some("1"));
        assert_eq!(req.query_value("b"), Some("y"));
        assert_eq!(req.full_url(), "http://a.com/q?a=1&b=y&c=1&c=2");
    }

    #[test]
    fn header_template_merges_over_static_headers() {
        let resolver = MappingResolver::new();
        let svc = ServiceConfig {
            headers: Some(HeaderSpec::Mapping(
                json!({"x-static": "s", "x-token": "old"}).as_object().unwrap().clone(),
            )),
            header_template: Some(json!("{{headers}}")),
            ..Default::default()
        };
        let req = plan("/h", &svc, &resolver)
            .resolve(&json!({"headers": {"x-token": "new", "x-extra": 1}}))
            .unwrap();
        assert_eq!(req.header("x-static"), Some("s"));
        assert_eq!(req.header("x-token"), Some("new"));
        assert_eq!(req.header("x-extra"), Some("1"));
    }

    #[test]
    fn failing_header_and_query_templates_degrade_to_empty() {
        let resolver = MappingResolver::new()
            .with_mapper(r"\[\[(.+?)]]", |_| None)
            .unwrap();
        let svc = service(json!({
            "host": "http://a.com",
            "headers": {"x-ok": "yes", "x-bad": "{{v [[broken]]}}"},
            "query": {"ok": "1", "bad": "{{v [[broken]]}}"}
        }));
        let req = plan("/lenient", &svc, &resolver)
            .resolve(&json!({"v": 1}))
            .unwrap();
        assert_eq!(req.header("x-ok"), Some("yes"));
        assert!(req.header("x-bad").is_none());
        assert_eq!(req.query, vec![("ok".to_string(), "1".to_string())]);
    }

    #[test]
    fn method_template_defaults_to_get() {
        let resolver = MappingResolver::new();
        let svc = service(json!({"method": "{{verb}}"}));
        let req = plan("/m", &svc, &resolver).resolve(&json!({})).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        let req = plan("/m", &svc, &resolver)
            .resolve(&json!({"verb": "PUT"}))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Put);
    }

    #[test]
    fn body_modes() {
        let resolver = MappingResolver::new();
        let data = json!({"name": "n", "extra": true});

        let auto = service(json!({"method": "post", "type": "auto", "data": {"ignored": "{{name}}"}}));
        let req = plan("/b", &auto, &resolver).resolve(&data).unwrap();
        assert_eq!(req.body, RequestBody::Json(data.clone()));
        assert_eq!(req.header("content-type"), Some("application/json"));

        let templated = service(json!({"method": "put", "data": {"n": "{{name}}", "gone": "{{nope}}"}}));
        let req = plan("/b", &templated, &resolver).resolve(&data).unwrap();
        assert_eq!(req.body, RequestBody::Json(json!({"n": "n"})));

        let text = service(json!({"method": "post", "data": "raw-{{name}}"}));
        let req = plan("/b", &text, &resolver).resolve(&data).unwrap();
        assert_eq!(req.body, RequestBody::Text("raw-n".into()));

        let read = service(json!({"method": "get", "data": {"n": "{{name}}"}}));
        let req = plan("/b", &read, &resolver).resolve(&data).unwrap();
        assert_eq!(req.body, RequestBody::Empty);

        let encoded = service(json!({"method": "post", "isURLEncoded": true, "data": {"n": "{{name}} x"}}));
        let req = plan("/b", &encoded, &resolver).resolve(&data).unwrap();
        assert_eq!(req.body, RequestBody::UrlEncoded("n=n%20x".into()));
        assert_eq!(req.header("content-type"), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn form_mode_respects_filters_and_empty_fields() {
        let resolver = MappingResolver::new();
        let svc = service(json!({
            "method": "post",
            "isFormData": true,
            "data": {"a": "{{a}}", "b": "{{b}}", "c": "{{c}}"}
        }));
        let mut p = plan("/f", &svc, &resolver);
        p.filter = FieldFilter::Avoid(vec!["c".into()]);
        let req = p.resolve(&json!({"a": 1, "c": 3})).unwrap();
        assert_eq!(
            req.body,
            RequestBody::Form(vec![("a".into(), "1".into()), ("b".into(), String::new())])
        );

        let svc = ServiceConfig {
            delete_empty_fields: true,
            ..svc
        };
        let req = plan("/f", &svc, &resolver)
            .resolve(&json!({"a": 1, "c": 3}))
            .unwrap();
        assert_eq!(
            req.body,
            RequestBody::Form(vec![("a".into(), "1".into()), ("c".into(), "3".into())])
        );
    }
}
