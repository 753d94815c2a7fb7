//! Request/response-pair transport

use super::{DispatchContext, Transport, TransportResponse, body_buffer, classify};
use crate::error::{Result, ServiceError};
use crate::execution::{EventKind, ProgressEvent, RequestBody, ResolvedRequest};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

pub(super) const NAME: &str = "fetch";

/// Transport that assembles a complete `reqwest::Request` up front.
///
/// The URL (query included) is composed by hand and the multipart payload is
/// appended part by part onto a `reqwest::multipart::Form`. Download progress
/// is measured while draining the body stream, and the
/// response is rebuilt from the buffered bytes afterwards. There is no
/// upload streaming: a single `{loaded: 0, total: 0}` upload event stands in
/// for it. Non-2xx statuses are detected explicitly and rejected.
#[derive(Debug, Clone)]
pub struct FetchTransport {
    client: reqwest::Client,
}

impl FetchTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: ResolvedRequest) -> Result<reqwest::Request> {
        let url = reqwest::Url::parse(&request.full_url()).map_err(|e| {
            ServiceError::InvalidArgument(format!("Invalid URL '{}': {e}", request.url))
        })?;
        let is_form = matches!(request.body, RequestBody::Form(_));
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ServiceError::InvalidArgument(format!("Invalid header name '{name}': {e}"))
            })?;
            // The form sets its own boundary.
            if is_form && header_name == CONTENT_TYPE {
                continue;
            }
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ServiceError::InvalidArgument(format!("Invalid header value for '{name}': {e}"))
            })?;
            headers.insert(header_name, header_value);
        }

        let builder = self.client.request(request.method.to_reqwest(), url);
        let builder = match request.body {
            RequestBody::Empty => builder.headers(headers),
            RequestBody::Json(value) => {
                set_default_content_type(&mut headers, "application/json");
                builder.headers(headers).body(serde_json::to_vec(&value)?)
            }
            RequestBody::Text(text) => builder.headers(headers).body(text),
            RequestBody::UrlEncoded(text) => {
                set_default_content_type(&mut headers, "application/x-www-form-urlencoded");
                builder.headers(headers).body(text)
            }
            RequestBody::Form(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.part(name, reqwest::multipart::Part::text(value));
                }
                builder.headers(headers).multipart(form)
            }
        };
        Ok(builder.build()?)
    }

    async fn exchange(
        &self,
        request: reqwest::Request,
        ctx: &DispatchContext,
    ) -> Result<TransportResponse> {
        let has_body = request.body().is_some();
        let track = ctx.emitter.has_listeners(EventKind::Progress);
        if has_body && track {
            ctx.emitter.progress(ProgressEvent::upload(0, 0));
        }

        let response = self.client.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let total = response.content_length().unwrap_or(0);

        let mut buffer = body_buffer(total);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            if track {
                ctx.emitter
                    .progress(ProgressEvent::download(buffer.len() as u64, total));
            }
        }

        classify(status, headers, &buffer)
    }
}

fn set_default_content_type(headers: &mut HeaderMap, value: &'static str) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
    }
}

impl Default for FetchTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Transport for FetchTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports_abort(&self) -> bool {
        true
    }

    async fn dispatch(
        &self,
        request: ResolvedRequest,
        ctx: &DispatchContext,
    ) -> Result<TransportResponse> {
        let built = self.build_request(request)?;
        ctx.cancel.run(self.exchange(built, ctx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::HttpMethod;
    use serde_json::json;

    #[test]
    fn composes_url_and_default_content_type() {
        let mut request = ResolvedRequest::new(HttpMethod::Put, "https://api.test/items");
        request.query.push(("ids".into(), "1".into()));
        request.query.push(("ids".into(), "2".into()));
        request.body = RequestBody::Json(json!({"a": 1}));

        let built = FetchTransport::default().build_request(request).unwrap();
        assert_eq!(*built.method(), reqwest::Method::PUT);
        assert_eq!(built.url().as_str(), "https://api.test/items?ids=1&ids=2");
        assert_eq!(built.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let mut request = ResolvedRequest::new(HttpMethod::Post, "https://api.test/items");
        request.set_header("Content-Type", "application/vnd.api+json");
        request.body = RequestBody::Json(json!({}));
        let built = FetchTransport::default().build_request(request).unwrap();
        assert_eq!(built.headers()[CONTENT_TYPE], "application/vnd.api+json");
    }

    #[test]
    fn multipart_owns_its_content_type() {
        let mut request = ResolvedRequest::new(HttpMethod::Post, "https://api.test/upload");
        request.set_header("Content-Type", "application/json");
        request.body = RequestBody::Form(vec![("f".into(), "v".into())]);
        let built = FetchTransport::default().build_request(request).unwrap();
        let content_types: Vec<_> = built.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(content_types.len(), 1);
        let content_type = content_types[0].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let mut request = ResolvedRequest::new(HttpMethod::Get, "https://api.test/");
        request.headers.push(("bad header".into(), "x".into()));
        let err = FetchTransport::default().build_request(request).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }
}
