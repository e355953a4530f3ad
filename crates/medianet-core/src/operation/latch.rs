//! Indirection cell holding the abort target of a multi-stage operation.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{wait_for_settle, AbortFn, AbortableOperation, OperationResult, Step};

/// Current abort target of a chain, swapped once per stage transition.
///
/// `abort()` flags the latch, fires the cancellation token (which rejects a
/// chain still waiting on its upstream) and calls the current target. A target
/// installed after the latch was aborted is called immediately, so an abort
/// racing a stage transition still reaches the new stage.
pub(crate) struct AbortLatch {
    cancel: CancellationToken,
    state: Mutex<LatchState>,
}

struct LatchState {
    target: AbortFn,
    aborted: bool,
}

impl AbortLatch {
    pub(crate) fn new(target: AbortFn) -> Arc<Self> {
        Arc::new(Self {
            cancel: CancellationToken::new(),
            state: Mutex::new(LatchState {
                target,
                aborted: false,
            }),
        })
    }

    pub(crate) fn abort(&self) -> BoxFuture<'static, ()> {
        let target = {
            let mut state = self.state.lock();
            state.aborted = true;
            Arc::clone(&state.target)
        };
        self.cancel.cancel();
        target()
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Resolves once `abort()` has been called.
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub(crate) fn redirect(&self, target: AbortFn) {
        let already_aborted = {
            let mut state = self.state.lock();
            state.target = Arc::clone(&target);
            state.aborted
        };
        if already_aborted {
            drop(target());
        }
    }

    pub(crate) fn redirect_to<T>(&self, operation: &AbortableOperation<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.redirect(operation.abort_fn());
    }

    /// Settle a chain stage from the callback's return value, pointing the
    /// latch at whatever is now live.
    pub(crate) async fn follow<T>(&self, step: OperationResult<Step<T>>) -> OperationResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match step {
            Err(error) => {
                self.redirect(super::noop_abort());
                Err(error)
            }
            Ok(Step::Value(value)) => {
                self.redirect(super::noop_abort());
                Ok(value)
            }
            Ok(Step::Future(deferred)) => {
                let deferred = futures::FutureExt::shared(deferred);
                self.redirect(wait_for_settle(deferred.clone()));
                deferred.await
            }
            Ok(Step::Operation(operation)) => {
                self.redirect_to(&operation);
                operation.result().await
            }
        }
    }
}
