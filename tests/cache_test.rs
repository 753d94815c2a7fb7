//! Response cache and in-flight deduplication through `Executor::send`.

mod support;

use serde_json::json;
use servicetree::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use support::MockTransport;

fn service() -> ServiceConfig {
    serde_json::from_value(json!({"host": "https://api.test"})).unwrap()
}

fn executor(transport: Arc<MockTransport>, cache: Arc<ResponseCache>) -> Executor {
    Executor::new("users.list", "/users", service(), transport).with_cache(cache)
}

#[tokio::test]
async fn concurrent_sends_share_one_dispatch() {
    let transport = Arc::new(MockTransport::ok(json!(["ada"])).delayed(Duration::from_millis(50)));
    let cache = Arc::new(ResponseCache::default());
    let first = executor(transport.clone(), cache.clone()).cache(Some("all"));
    let second = executor(transport.clone(), cache.clone()).cache(Some("all"));

    let (a, b) = tokio::join!(first.send(json!({})), second.send(json!({})));
    assert_eq!(a.unwrap(), json!(["ada"]));
    assert_eq!(b.unwrap(), json!(["ada"]));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn concurrent_sends_share_one_dispatch_across_tasks() {
    let transport = Arc::new(MockTransport::ok(json!(1)).delayed(Duration::from_millis(50)));
    let cache = Arc::new(ResponseCache::default());
    let exec = executor(transport.clone(), cache).cache(None);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let exec = exec.clone();
            tokio::spawn(async move { exec.send(json!({})).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!(1));
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn settled_values_are_replayed_without_dispatch() {
    let transport = Arc::new(MockTransport::ok(json!({"v": 1})));
    let exec = executor(transport.clone(), Arc::new(ResponseCache::default())).cache(Some("k"));

    assert_eq!(exec.send(json!({})).await.unwrap(), json!({"v": 1}));
    transport.respond_with(json!({"v": 2}));
    assert_eq!(exec.send(json!({})).await.unwrap(), json!({"v": 1}));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn failures_are_cached_and_replayed() {
    let transport = Arc::new(MockTransport::failing(ServiceError::api_error(
        503,
        "HTTP 503: Service Unavailable",
        Some(json!({"retry": true})),
    )));
    let exec = executor(transport.clone(), Arc::new(ResponseCache::default())).cache(Some("k"));

    let first = exec.send(json!({})).await.unwrap_err();
    let replay = exec.send(json!({})).await.unwrap_err();
    assert_eq!(first.status_code(), Some(503));
    assert_eq!(replay.status_code(), Some(503));
    assert_eq!(replay.response_body(), Some(&json!({"retry": true})));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn without_cache_every_send_dispatches() {
    let transport = Arc::new(MockTransport::ok(json!(null)));
    let exec = executor(transport.clone(), Arc::new(ResponseCache::default()));
    exec.send(json!({})).await.unwrap();
    exec.send(json!({})).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn distinct_services_never_share_entries() {
    let transport = Arc::new(MockTransport::ok(json!("x")));
    let cache = Arc::new(ResponseCache::default());
    let users = Executor::new("users.list", "/same", service(), transport.clone())
        .with_cache(cache.clone())
        .cache(Some("k"));
    let teams = Executor::new("teams.list", "/same", service(), transport.clone())
        .with_cache(cache.clone())
        .cache(Some("k"));

    users.send(json!({})).await.unwrap();
    teams.send(json!({})).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn per_transport_scope_separates_transports() {
    let a = Arc::new(MockTransport::ok(json!("a")).named("alpha"));
    let b = Arc::new(MockTransport::ok(json!("b")).named("beta"));
    let cache = Arc::new(ResponseCache::new(CacheScope::PerTransport));

    let via_a = executor(a.clone(), cache.clone()).cache(Some("k"));
    let via_b = executor(b.clone(), cache.clone()).cache(Some("k"));
    assert_eq!(via_a.send(json!({})).await.unwrap(), json!("a"));
    assert_eq!(via_b.send(json!({})).await.unwrap(), json!("b"));
    assert_eq!((a.calls(), b.calls()), (1, 1));
}

#[tokio::test]
async fn shared_scope_spans_transports() {
    let a = Arc::new(MockTransport::ok(json!("a")).named("alpha"));
    let b = Arc::new(MockTransport::ok(json!("b")).named("beta"));
    let cache = Arc::new(ResponseCache::new(CacheScope::Shared));

    let via_a = executor(a.clone(), cache.clone()).cache(Some("k"));
    let via_b = executor(b.clone(), cache.clone()).cache(Some("k"));
    assert_eq!(via_a.send(json!({})).await.unwrap(), json!("a"));
    assert_eq!(via_b.send(json!({})).await.unwrap(), json!("a"));
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn construction_errors_are_not_cached() {
    let transport = Arc::new(MockTransport::ok(json!(1)));
    let cache = Arc::new(ResponseCache::default());
    let exec = executor(transport, cache.clone()).cache(Some("k"));
    assert!(exec.clone().override_url("").is_err());
    assert!(cache.is_empty());
}
