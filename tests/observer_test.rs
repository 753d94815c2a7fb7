//! Request observers see each exchange once, before response transformers.

mod support;

use serde_json::{Value, json};
use servicetree::observability::RequestInfo;
use servicetree::prelude::*;
use std::sync::{Arc, Mutex};
use support::MockTransport;

#[derive(Default)]
struct Recorder {
    lines: Mutex<Vec<String>>,
}

impl RequestObserver for Recorder {
    fn request(&self, info: &RequestInfo) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("request {} {}", info.method, info.url));
    }

    fn response(&self, status: u16, _info: &RequestInfo, body: &Value) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("response {status} {body}"));
    }

    fn error(&self, error: &ServiceError, _info: &RequestInfo) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("error {:?}", error.status_code()));
    }
}

fn config() -> Value {
    json!({
        "host": "https://api.test",
        "resources": {"users": {"path": "users", "services": {"list": {"query": {"page": "{{page}}"}}}}}
    })
}

#[tokio::test]
async fn observer_sees_raw_response_and_request_id() {
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(MockTransport::ok(json!({"items": []})));
    let options = ServicesOptions::default()
        .with_custom_transport(transport.clone())
        .with_observer(recorder.clone())
        .with_transformer(Transformer::response(|_| json!("transformed")));
    let services = ServiceTree::build(config(), options).unwrap();

    let out = services
        .executor("users", "list")
        .unwrap()
        .send(json!({"page": 2}))
        .await
        .unwrap();
    assert_eq!(out, json!("transformed"));

    let lines = recorder.lines.lock().unwrap().clone();
    assert_eq!(
        lines,
        [
            "request GET https://api.test/users?page=2",
            r#"response 200 {"items":[]}"#,
        ]
    );
    assert!(uuid_like(&transport.last_request().request_id));
}

#[tokio::test]
async fn observer_sees_failures() {
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(MockTransport::failing(ServiceError::api_error(
        500,
        "HTTP 500: Internal Server Error",
        None,
    )));
    let options = ServicesOptions::default()
        .with_custom_transport(transport)
        .with_observer(recorder.clone());
    let services = ServiceTree::build(config(), options).unwrap();

    let err = services
        .executor("users", "list")
        .unwrap()
        .send(json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Server);
    assert_eq!(
        recorder.lines.lock().unwrap().last().map(String::as_str),
        Some("error Some(500)")
    );
}

fn uuid_like(id: &str) -> bool {
    id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4
}
