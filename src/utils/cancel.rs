//! Cancellation utilities
//!
//! Provides first-class cancellation handles for in-flight dispatches.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Transports observing this handle stop as soon as
    /// possible; dropping the in-flight exchange closes the connection.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Run `future` until it completes or cancellation is requested, in which
    /// case the future is dropped and `ServiceError::Aborted` is returned.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            _ = self.token.cancelled() => Err(ServiceError::Aborted),
            res = future => res,
        }
    }
}
