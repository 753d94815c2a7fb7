//! Response cache and in-flight deduplication
//!
//! Entries are keyed by a caller-chosen string and never expire. A miss
//! stores the pending outcome *before* it settles, so concurrent callers with
//! the same key join one in-flight request instead of starting their own.
//! The check and the insert happen under one lock, which keeps that
//! guarantee on a multi-threaded runtime.

use crate::error::{Result, ServiceError};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Pending outcome that every joined caller can await.
pub type SharedOutcome = Shared<BoxFuture<'static, Result<Value>>>;

/// Whether executors backed by different transports share entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheScope {
    /// Entries are namespaced by transport name.
    #[default]
    PerTransport,
    /// One table for every transport.
    Shared,
}

/// Cached value for one key.
#[derive(Clone)]
pub enum CacheEntry {
    Pending(SharedOutcome),
    Ready(Value),
    Failed(ServiceError),
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending(_) => f.write_str("Pending"),
            Self::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

impl CacheEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Future yielding this entry's outcome: joins a pending request or
    /// replays a settled one.
    pub fn outcome(&self) -> BoxFuture<'static, Result<Value>> {
        match self {
            Self::Pending(shared) => shared.clone().boxed(),
            Self::Ready(value) => futures::future::ready(Ok(value.clone())).boxed(),
            Self::Failed(err) => futures::future::ready(Err(err.clone())).boxed(),
        }
    }
}

impl From<Result<Value>> for CacheEntry {
    fn from(outcome: Result<Value>) -> Self {
        match outcome {
            Ok(value) => Self::Ready(value),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Process-wide (or explicitly shared) response cache.
#[derive(Debug, Default)]
pub struct ResponseCache {
    scope: CacheScope,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(scope: CacheScope) -> Self {
        Self {
            scope,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> CacheScope {
        self.scope
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Storage key for a cache key used by an executor on `transport`.
    pub fn storage_key(&self, transport: &str, key: &str) -> String {
        match self.scope {
            CacheScope::PerTransport => format!("{transport}|{key}"),
            CacheScope::Shared => key.to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, entry: CacheEntry) {
        self.lock().insert(key.into(), entry);
    }

    /// Store a settled outcome.
    pub fn settle(&self, key: &str, outcome: &Result<Value>) {
        tracing::trace!(target: "servicetree::cache", key, is_error = outcome.is_err(), "settling cache entry");
        self.put(key, CacheEntry::from(outcome.clone()));
    }

    /// Return the existing entry for `key`, or store the pending outcome
    /// produced by `start` and return it. Atomic with respect to other callers.
    pub fn get_or_start<F>(&self, key: &str, start: F) -> CacheEntry
    where
        F: FnOnce() -> SharedOutcome,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(key) {
            tracing::debug!(target: "servicetree::cache", key, pending = existing.is_pending(), "cache hit");
            return existing.clone();
        }
        let entry = CacheEntry::Pending(start());
        entries.insert(key.to_string(), entry.clone());
        entry
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.lock().remove(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn storage_keys_follow_scope() {
        assert_eq!(
            ResponseCache::new(CacheScope::PerTransport).storage_key("fetch", "users.get"),
            "fetch|users.get"
        );
        assert_eq!(
            ResponseCache::new(CacheScope::Shared).storage_key("fetch", "users.get"),
            "users.get"
        );
    }

    #[test]
    fn settled_entries_replay() {
        let cache = ResponseCache::default();
        cache.settle("ok", &Ok(json!(1)));
        cache.settle("bad", &Err(ServiceError::api_error(500, "boom", None)));
        let ok = tokio_test::block_on(cache.get("ok").unwrap().outcome());
        assert_eq!(ok.unwrap(), json!(1));
        let bad = cache.get("bad").unwrap();
        assert!(bad.is_error());
        let replay = tokio_test::block_on(bad.outcome());
        assert_eq!(replay.unwrap_err().status_code(), Some(500));
    }

    #[tokio::test]
    async fn get_or_start_only_starts_once() {
        let cache = ResponseCache::default();
        let mut starts = 0;
        let first = cache.get_or_start("k", || {
            starts += 1;
            async { Ok::<_, ServiceError>(json!("v")) }.boxed().shared()
        });
        let second = cache.get_or_start("k", || {
            starts += 1;
            async { Ok::<_, ServiceError>(json!("other")) }.boxed().shared()
        });
        assert_eq!(starts, 1);
        assert!(first.is_pending() && second.is_pending());
        assert_eq!(second.outcome().await.unwrap(), json!("v"));
        assert_eq!(first.outcome().await.unwrap(), json!("v"));
    }
}
