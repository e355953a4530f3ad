//! Caller-facing handle for an in-flight request.

use futures::future::BoxFuture;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::operation::{AbortableOperation, OperationResult};
use crate::request::Response;

/// Bytes a segment transfer still expects, as last reported by its plugin.
#[derive(Debug, Default)]
pub struct BytesRemaining(AtomicU64);

impl BytesRemaining {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::Relaxed);
    }
}

/// The outer operation of one `request()` call.
#[derive(Clone)]
pub struct PendingRequest {
    operation: AbortableOperation<Response>,
    bytes_remaining: Arc<BytesRemaining>,
}

impl PendingRequest {
    pub(crate) fn new(operation: AbortableOperation<Response>, bytes_remaining: Arc<BytesRemaining>) -> Self {
        Self {
            operation,
            bytes_remaining,
        }
    }

    /// Cancel whichever stage is live (filter, backoff wait or transport).
    pub fn abort(&self) -> BoxFuture<'static, ()> {
        self.operation.abort()
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_remaining.get()
    }

    pub fn operation(&self) -> &AbortableOperation<Response> {
        &self.operation
    }

    pub async fn response(&self) -> OperationResult<Response> {
        self.operation.result().await
    }
}

impl IntoFuture for PendingRequest {
    type Output = OperationResult<Response>;
    type IntoFuture = <AbortableOperation<Response> as IntoFuture>::IntoFuture;

    fn into_future(self) -> Self::IntoFuture {
        self.operation.into_future()
    }
}
