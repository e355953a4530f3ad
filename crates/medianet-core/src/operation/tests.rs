use super::*;
use parking_lot::Mutex;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tokio::sync::oneshot;

/// An operation that only settles (with the abort error) once aborted.
fn hanging(abort_calls: Arc<AtomicUsize>) -> AbortableOperation<u32> {
    let (tx, rx) = oneshot::channel::<()>();
    let tx = Mutex::new(Some(tx));
    AbortableOperation::new(
        async move {
            let _ = rx.await;
            Err(Error::aborted())
        },
        move || {
            abort_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(());
            }
            future::ready(()).boxed()
        },
    )
}

#[tokio::test]
async fn completed_chain_settles_with_callback_value() {
    let op = AbortableOperation::completed(20u32).and_then(|v| Ok(Step::Value(v + 1)));
    assert_eq!(op.await.unwrap(), 21);
}

#[tokio::test]
async fn chain_follows_nested_operation_outcome() {
    let op = AbortableOperation::completed(2u32)
        .and_then(|v| Ok(Step::Operation(AbortableOperation::completed(v * 10))));
    assert_eq!(op.await.unwrap(), 20);

    let op: AbortableOperation<u32> = AbortableOperation::completed(2u32)
        .and_then(|_| Ok(Step::Operation(AbortableOperation::failed(Error::missing_uri()))));
    let err = op.await.unwrap_err();
    assert!(matches!(err.kind(), crate::error::ErrorKind::MissingUri));
}

#[tokio::test]
async fn chain_follows_deferred_value() {
    let op = AbortableOperation::completed(3u32).and_then(|v| {
        Ok(Step::future(async move {
            tokio::task::yield_now().await;
            Ok(v * 3)
        }))
    });
    assert_eq!(op.await.unwrap(), 9);
}

#[tokio::test]
async fn failed_upstream_runs_error_callback() {
    let op = AbortableOperation::<u32>::failed(Error::missing_uri())
        .chain(|_| Ok(Step::Value(0u32)), |_| Ok(Step::Value(99u32)));
    assert_eq!(op.await.unwrap(), 99);
}

#[tokio::test]
async fn failed_upstream_skips_success_callback_with_and_then() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let op = AbortableOperation::<u32>::failed(Error::missing_uri()).and_then(move |v| {
        flag.store(true, Ordering::SeqCst);
        Ok(Step::Value(v))
    });
    assert!(op.await.is_err());
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn abort_before_upstream_settles_never_runs_callback() {
    let abort_calls = Arc::new(AtomicUsize::new(0));
    let upstream = hanging(Arc::clone(&abort_calls));
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let chained = upstream.and_then(move |v| {
        flag.store(true, Ordering::SeqCst);
        Ok(Step::Value(v))
    });

    chained.abort().await;
    let err = chained.clone().await.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(abort_calls.load(Ordering::SeqCst), 1);
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn abort_targets_nested_operation_once_live() {
    let abort_calls = Arc::new(AtomicUsize::new(0));
    let nested_calls = Arc::clone(&abort_calls);
    let (entered_tx, entered_rx) = oneshot::channel();
    let chained = AbortableOperation::completed(1u32).and_then(move |_| {
        let _ = entered_tx.send(());
        Ok(Step::Operation(hanging(nested_calls)))
    });

    entered_rx.await.unwrap();
    // Give the chain a moment to install the nested abort target.
    tokio::time::sleep(Duration::from_millis(10)).await;
    chained.abort().await;

    let err = chained.clone().await.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(abort_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abort_after_plain_value_is_noop() {
    let op = AbortableOperation::completed(5u32).and_then(|v| Ok(Step::Value(v)));
    assert_eq!(op.clone().await.unwrap(), 5);
    op.abort().await;
    assert_eq!(op.await.unwrap(), 5);
}

#[tokio::test]
async fn callback_error_rejects_chain() {
    let op: AbortableOperation<u32> =
        AbortableOperation::completed(5u32).and_then(|_| Err(Error::malformed_uri("x")));
    let err = op.clone().await.unwrap_err();
    assert!(matches!(err.kind(), crate::error::ErrorKind::MalformedUri { .. }));
    // Abort resolves right away.
    op.abort().await;
}

#[tokio::test]
async fn aborted_upstream_that_still_succeeds_stops_chain() {
    let upstream = AbortableOperation::not_abortable(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(7u32)
    });
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let chained = upstream.and_then(move |v| {
        flag.store(true, Ordering::SeqCst);
        Ok(Step::Value(v))
    });
    // Not-abortable: abort waits for the upstream to finish.
    chained.abort().await;
    assert!(chained.await.unwrap_err().is_aborted());
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn not_abortable_abort_waits_for_settle() {
    let op = AbortableOperation::not_abortable(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(1u32)
    });
    let start = tokio::time::Instant::now();
    op.abort().await;
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(op.await.unwrap(), 1);
}

#[tokio::test]
async fn all_collects_values_in_order() {
    let op = AbortableOperation::all(vec![
        AbortableOperation::completed(1u32),
        AbortableOperation::completed(2),
        AbortableOperation::completed(3),
    ]);
    assert_eq!(op.await.unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn all_fails_on_first_failure() {
    let op = AbortableOperation::all(vec![
        AbortableOperation::completed(1u32),
        AbortableOperation::failed(Error::missing_uri()),
    ]);
    assert!(op.await.is_err());
}

#[tokio::test]
async fn all_abort_reaches_every_member_once() {
    let counts: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let settled_calls = Arc::new(AtomicUsize::new(0));
    let settled_counter = Arc::clone(&settled_calls);
    let settled = AbortableOperation::new(async { Ok(0u32) }, move || {
        settled_counter.fetch_add(1, Ordering::SeqCst);
        future::ready(()).boxed()
    });
    // Let the settled member finish first.
    assert_eq!(settled.clone().await.unwrap(), 0);

    let mut members: Vec<_> = counts.iter().map(|c| hanging(Arc::clone(c))).collect();
    members.push(settled);
    let all = AbortableOperation::all(members);
    all.abort().await;

    assert!(all.await.unwrap_err().is_aborted());
    for c in &counts {
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }
    assert_eq!(settled_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn aborted_constructor_is_settled() {
    let op = AbortableOperation::<u32>::aborted();
    op.abort().await;
    assert!(op.await.unwrap_err().is_aborted());
}

#[tokio::test]
async fn finally_reports_outcome_and_keeps_abort() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let ok = AbortableOperation::completed(1u32).finally(move |success| log.lock().push(success));
    ok.await.unwrap();

    let log = Arc::clone(&seen);
    let abort_calls = Arc::new(AtomicUsize::new(0));
    let failing = hanging(Arc::clone(&abort_calls)).finally(move |success| log.lock().push(success));
    failing.abort().await;
    assert!(failing.await.is_err());

    assert_eq!(*seen.lock(), vec![true, false]);
    assert_eq!(abort_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn result_can_be_awaited_by_many() {
    let op = AbortableOperation::new(async { Ok(String::from("x")) }, noop_abort_fn);
    let a = op.result();
    let b = op.result();
    assert_eq!(a.await.unwrap(), "x");
    assert_eq!(b.await.unwrap(), "x");
}

fn noop_abort_fn() -> BoxFuture<'static, ()> {
    future::ready(()).boxed()
}
