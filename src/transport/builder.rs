//! Fluent request-builder transport

use super::{DispatchContext, Transport, TransportResponse, body_buffer, classify};
use crate::error::Result;
use crate::execution::{EventKind, HttpMethod, ProgressEvent, RequestBody, ResolvedRequest};
use async_trait::async_trait;

pub(super) const NAME: &str = "builder";

/// Transport built on `reqwest::RequestBuilder`.
///
/// Query parameters and multipart fields go through the builder's own
/// helpers. Cancellation is not supported: `Executor::abort` is a no-op.
#[derive(Debug, Clone)]
pub struct BuilderTransport {
    client: reqwest::Client,
}

impl BuilderTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn builder_for(&self, method: HttpMethod, url: &str) -> reqwest::RequestBuilder {
        match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Patch => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
            HttpMethod::Head => self.client.head(url),
            HttpMethod::Options => self.client.request(reqwest::Method::OPTIONS, url),
        }
    }
}

impl Default for BuilderTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Transport for BuilderTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn dispatch(
        &self,
        request: ResolvedRequest,
        ctx: &DispatchContext,
    ) -> Result<TransportResponse> {
        let ResolvedRequest {
            method,
            url,
            query,
            mut headers,
            body,
            ..
        } = request;

        let upload_size = body.len_hint();
        let has_body = !body.is_empty();

        let mut builder = self.builder_for(method, &url);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if matches!(body, RequestBody::Form(_)) {
            // The multipart helper sets its own boundary.
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
        }
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Text(text) | RequestBody::UrlEncoded(text) => builder.body(text),
            RequestBody::Form(fields) => {
                let form = fields
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name, value)
                    });
                builder.multipart(form)
            }
        };

        // Reported once the body is handed to the client, not per chunk.
        if has_body {
            ctx.emitter
                .progress(ProgressEvent::upload(upload_size, upload_size));
        }
        let mut response = builder.send().await?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let total = response.content_length().unwrap_or(0);
        let track = ctx.emitter.has_listeners(EventKind::Progress);

        let mut buffer = body_buffer(total);
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            if track {
                ctx.emitter
                    .progress(ProgressEvent::download(buffer.len() as u64, total));
            }
        }

        classify(status, response_headers, &buffer)
    }
}
