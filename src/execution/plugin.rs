//! Request plugins
//!
//! A plugin sees every assembled request once, after resolution and before
//! dispatch, and may mutate it (add headers, rewrite the URL, ...).

use super::request::ResolvedRequest;

/// Request mutation hook.
pub trait RequestPlugin: Send + Sync {
    fn apply(&self, request: &mut ResolvedRequest);
}

impl<F> RequestPlugin for F
where
    F: Fn(&mut ResolvedRequest) + Send + Sync,
{
    fn apply(&self, request: &mut ResolvedRequest) {
        self(request)
    }
}

/// Adds a fixed header to every request.
#[derive(Debug, Clone)]
pub struct HeaderPlugin {
    name: String,
    value: String,
}

impl HeaderPlugin {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl RequestPlugin for HeaderPlugin {
    fn apply(&self, request: &mut ResolvedRequest) {
        request.set_header(self.name.clone(), self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::request::HttpMethod;

    #[test]
    fn closures_and_header_plugin_mutate_request() {
        let mut req = ResolvedRequest::new(HttpMethod::Get, "http://a.com");
        HeaderPlugin::new("x-trace", "1").apply(&mut req);
        let rewrite = |r: &mut ResolvedRequest| r.url.push_str("/v2");
        rewrite.apply(&mut req);
        assert_eq!(req.header("X-Trace"), Some("1"));
        assert_eq!(req.url, "http://a.com/v2");
    }
}
