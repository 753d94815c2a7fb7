//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use servicetree::execution::ResolvedRequest;
use servicetree::transport::{DispatchContext, Transport, TransportResponse};
use servicetree::{Result, ServiceError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic transport: counts dispatches, records requests and
/// answers with a fixed body or failure after an optional delay.
#[derive(Debug)]
pub struct MockTransport {
    name: &'static str,
    calls: AtomicUsize,
    requests: Mutex<Vec<ResolvedRequest>>,
    outcome: Mutex<std::result::Result<Value, ServiceError>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn ok(body: Value) -> Self {
        Self {
            name: "mock",
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            outcome: Mutex::new(Ok(body)),
            delay: None,
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            outcome: Mutex::new(Err(error)),
            ..Self::ok(Value::Null)
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond_with(&self, body: Value) {
        *self.outcome.lock().unwrap() = Ok(body);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ResolvedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ResolvedRequest {
        self.requests()
            .pop()
            .expect("at least one request was dispatched")
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn dispatch(
        &self,
        request: ResolvedRequest,
        _ctx: &DispatchContext,
    ) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self.outcome.lock().unwrap().clone();
        outcome.map(|body| TransportResponse {
            status: 200,
            headers: Default::default(),
            body,
        })
    }
}
