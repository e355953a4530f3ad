//! Tracks in-flight requests so teardown can abort them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::operation::AbortableOperation;
use crate::request::Response;

#[derive(Default)]
pub(crate) struct OperationTracker {
    next_id: AtomicU64,
    operations: Mutex<HashMap<u64, AbortableOperation<Response>>>,
}

impl OperationTracker {
    /// Track `operation` until it settles.
    pub(crate) fn manage(self: &Arc<Self>, operation: &AbortableOperation<Response>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.operations.lock().insert(id, operation.clone());
        let tracker: Weak<Self> = Arc::downgrade(self);
        // The returned operation only exists to run the callback.
        let _ = operation.clone().finally(move |_| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.operations.lock().remove(&id);
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.lock().len()
    }

    /// Abort everything tracked and wait for each to settle.
    pub(crate) async fn abort_all(&self) {
        let operations: Vec<_> = self.operations.lock().drain().map(|(_, op)| op).collect();
        let pending: Vec<_> = operations.iter().map(|op| op.abort()).collect();
        futures::future::join_all(pending).await;
        for op in operations {
            let _ = op.result().await;
        }
    }
}
