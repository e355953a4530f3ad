//! Abortable operations: a deferred result paired with an abort function.
//!
//! Every stage of the request pipeline (filters, backoff waits, transport
//! calls) is an [`AbortableOperation`]. Stages are linked with
//! [`AbortableOperation::chain`], whose abort always targets whichever stage is
//! live at the moment it is called, so a single top-level `abort()` cancels
//! exactly the work in progress.
//!
//! Operations run eagerly: constructing one from a future spawns it on the
//! current Tokio runtime, and the result can be awaited by any number of
//! clones.

mod latch;

#[cfg(test)]
mod tests;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;

pub(crate) use latch::AbortLatch;

pub type OperationResult<T> = Result<T, Error>;

/// Abort callback. Calling it must trigger cancellation right away; the
/// returned future only waits for the aborted work to settle.
pub type AbortFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

type SharedResult<T> = Shared<BoxFuture<'static, OperationResult<T>>>;

/// What a chain callback hands to the next stage.
pub enum Step<T> {
    /// A plain value; the stage is finished and can no longer be aborted.
    Value(T),
    /// A deferred value with no abort mechanism; abort waits for it to settle.
    Future(BoxFuture<'static, OperationResult<T>>),
    /// A nested operation; abort is redirected to it.
    Operation(AbortableOperation<T>),
}

impl<T> Step<T> {
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = OperationResult<T>> + Send + 'static,
    {
        Step::Future(fut.boxed())
    }
}

impl<T> From<AbortableOperation<T>> for Step<T> {
    fn from(operation: AbortableOperation<T>) -> Self {
        Step::Operation(operation)
    }
}

/// A result that will eventually be available, plus a way to abort producing it.
#[derive(Clone)]
pub struct AbortableOperation<T> {
    result: SharedResult<T>,
    on_abort: AbortFn,
    aborted: Arc<AtomicBool>,
}

impl<T> AbortableOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn `promise` on the current runtime; `on_abort` cancels it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<F, A>(promise: F, on_abort: A) -> Self
    where
        F: Future<Output = OperationResult<T>> + Send + 'static,
        A: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self::from_parts(spawn_shared(promise), Arc::new(on_abort))
    }

    pub fn completed(value: T) -> Self {
        Self::settled(Ok(value))
    }

    pub fn failed(error: Error) -> Self {
        Self::settled(Err(error))
    }

    /// Already failed with the canonical abort error.
    pub fn aborted() -> Self {
        Self::failed(Error::aborted())
    }

    /// Wrap work that cannot be cancelled: abort just waits for it to settle.
    pub fn not_abortable<F>(promise: F) -> Self
    where
        F: Future<Output = OperationResult<T>> + Send + 'static,
    {
        let result = spawn_shared(promise);
        let on_abort = wait_for_settle(result.clone());
        Self::from_parts(result, on_abort)
    }

    /// Succeeds with every member's value once all succeed; fails with the
    /// first failure. Aborting aborts every member.
    pub fn all(operations: Vec<AbortableOperation<T>>) -> AbortableOperation<Vec<T>> {
        let results: Vec<_> = operations.iter().map(|op| op.result.clone()).collect();
        AbortableOperation::new(future::try_join_all(results), move || {
            let pending: Vec<_> = operations.iter().map(|op| op.abort()).collect();
            future::join_all(pending).map(|_| ()).boxed()
        })
    }

    /// Abort the operation. Never fails; the returned future resolves once
    /// the aborted work has settled.
    pub fn abort(&self) -> BoxFuture<'static, ()> {
        self.aborted.store(true, Ordering::SeqCst);
        (self.on_abort)()
    }

    /// Whether `abort()` has been called on this operation (or a clone).
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// The eventual result. May be awaited any number of times.
    pub fn result(&self) -> impl Future<Output = OperationResult<T>> + Send + 'static {
        self.result.clone()
    }

    /// Run `on_success` (or `on_error`) once this operation settles.
    ///
    /// If the chain is aborted before this operation settles, this operation
    /// is aborted and the chain fails with the abort error without running
    /// either callback. Once a callback has run, abort targets the stage it
    /// returned: a nested operation is aborted, a deferred value is waited
    /// for, a plain value or callback error makes abort a no-op.
    pub fn chain<U, S, E>(self, on_success: S, on_error: E) -> AbortableOperation<U>
    where
        U: Clone + Send + Sync + 'static,
        S: FnOnce(T) -> OperationResult<Step<U>> + Send + 'static,
        E: FnOnce(Error) -> OperationResult<Step<U>> + Send + 'static,
    {
        let upstream = self.clone();
        let latch = AbortLatch::new(Arc::new(move || upstream.abort()));
        let stage = Arc::clone(&latch);
        let result = self.result.clone();
        let upstream_aborted = Arc::clone(&self.aborted);

        let promise = async move {
            let outcome = tokio::select! {
                biased;
                _ = stage.cancelled() => return Err(Error::aborted()),
                outcome = result => outcome,
            };
            let step = match outcome {
                // Aborted after settling but before the next stage began.
                Ok(_) if upstream_aborted.load(Ordering::SeqCst) => return Err(Error::aborted()),
                Ok(value) => on_success(value),
                Err(error) => on_error(error),
            };
            stage.follow(step).await
        };

        AbortableOperation::new(promise, move || latch.abort())
    }

    /// [`chain`](Self::chain) with errors passed along unchanged.
    pub fn and_then<U, S>(self, on_success: S) -> AbortableOperation<U>
    where
        U: Clone + Send + Sync + 'static,
        S: FnOnce(T) -> OperationResult<Step<U>> + Send + 'static,
    {
        self.chain(on_success, Err)
    }

    /// Call `on_final(succeeded)` once the operation settles. Abort behaviour
    /// is unchanged.
    pub fn finally<F>(self, on_final: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let result = self.result.clone();
        let promise = async move {
            let outcome = result.await;
            on_final(outcome.is_ok());
            outcome
        };
        Self {
            result: spawn_shared(promise),
            on_abort: self.on_abort,
            aborted: self.aborted,
        }
    }

    fn settled(outcome: OperationResult<T>) -> Self {
        Self::from_parts(future::ready(outcome).boxed().shared(), noop_abort())
    }

    fn from_parts(result: SharedResult<T>, on_abort: AbortFn) -> Self {
        Self {
            result,
            on_abort,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn abort_fn(&self) -> AbortFn {
        let this = self.clone();
        Arc::new(move || this.abort())
    }
}

impl<T> IntoFuture for AbortableOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = OperationResult<T>;
    type IntoFuture = SharedResult<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.result
    }
}

/// An abort function that does nothing.
pub(crate) fn noop_abort() -> AbortFn {
    Arc::new(|| future::ready(()).boxed())
}

/// An abort function that waits for `result` to settle and ignores its outcome.
pub(crate) fn wait_for_settle<T>(result: SharedResult<T>) -> AbortFn
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move || {
        let result = result.clone();
        async move {
            let _ = result.await;
        }
        .boxed()
    })
}

fn spawn_shared<T, F>(promise: F) -> SharedResult<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = OperationResult<T>> + Send + 'static,
{
    let handle = tokio::spawn(promise);
    async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            // Runtime shutting down.
            Err(_) => Err(Error::aborted()),
        }
    }
    .boxed()
    .shared()
}
