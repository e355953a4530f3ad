//! Retry loop and single-attempt dispatch.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::pending::BytesRemaining;
use super::registry::{HeadersReceived, ProgressUpdated};
use super::EngineInner;
use crate::error::Error;
use crate::operation::{noop_abort, AbortLatch, AbortableOperation, Step};
use crate::request::{Request, RequestType, Response};
use crate::retry::Backoff;
use crate::timer::Timer;

/// Outcome of the retry loop, handed to the response filter stage.
#[derive(Debug, Clone)]
pub(crate) struct Dispatched {
    pub(crate) response: Response,
    /// Whether the plugin reported incremental progress for this response.
    pub(crate) got_progress: bool,
    pub(crate) filter_time: Duration,
    pub(crate) is_head: bool,
}

/// Per-attempt state shared between the plugin callbacks, the timers and the
/// attempt's completion handlers. Dropping it stops both timers.
struct Attempt {
    timed_out: AtomicBool,
    got_progress: AtomicBool,
    headers_reported: AtomicBool,
    connection_timer: Option<Timer>,
    stall_timer: Option<Timer>,
    stall_timeout: Duration,
    plugin_operation: Mutex<Option<AbortableOperation<Response>>>,
    started: Mutex<Option<Instant>>,
}

impl Attempt {
    fn new(progress_support: bool, connection_timeout: Duration, stall_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Attempt>| {
            let timer = |armed: bool| {
                armed.then(|| {
                    let weak = weak.clone();
                    Timer::new(move || {
                        if let Some(attempt) = weak.upgrade() {
                            attempt.time_out();
                        }
                    })
                })
            };
            Attempt {
                timed_out: AtomicBool::new(false),
                got_progress: AtomicBool::new(false),
                headers_reported: AtomicBool::new(false),
                connection_timer: timer(progress_support && !connection_timeout.is_zero()),
                stall_timer: timer(progress_support && !stall_timeout.is_zero()),
                stall_timeout,
                plugin_operation: Mutex::new(None),
                started: Mutex::new(None),
            }
        })
    }

    /// A timer fired: mark the attempt and abort the transport call.
    fn time_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        let operation = self.plugin_operation.lock().clone();
        if let Some(operation) = operation {
            drop(operation.abort());
        }
    }

    fn on_progress(&self) {
        if let Some(timer) = &self.connection_timer {
            timer.stop();
        }
        if let Some(timer) = &self.stall_timer {
            timer.tick_after(self.stall_timeout);
        }
    }

    fn stop_timers(&self) {
        if let Some(timer) = &self.connection_timer {
            timer.stop();
        }
        if let Some(timer) = &self.stall_timer {
            timer.stop();
        }
    }

    fn elapsed(&self) -> Duration {
        self.started
            .lock()
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }
}

impl EngineInner {
    /// Drive attempts until one succeeds, a failure is not worth retrying,
    /// or the backoff runs out. URIs are tried round-robin; the same backoff
    /// state is threaded through the whole rotation.
    pub(super) fn make_request_with_retry(
        self: &Arc<Self>,
        request_type: RequestType,
        request: Request,
        bytes_remaining: Arc<BytesRemaining>,
        filter_time: Duration,
    ) -> AbortableOperation<Dispatched> {
        let latch = AbortLatch::new(noop_abort());
        let stage = Arc::clone(&latch);
        let inner = Arc::clone(self);

        let retry_loop = async move {
            let mut request = request;
            let mut backoff = Backoff::new(&request.retry_parameters, false);
            let mut index = 0usize;
            let mut last_error: Option<Error> = None;
            if request.uris.is_empty() {
                // A request filter dropped every URI.
                return Err(Error::missing_uri());
            }

            loop {
                if stage.is_aborted() {
                    return Err(Error::aborted());
                }
                let attempt = inner.send(request_type, &mut request, &mut backoff, index, &bytes_remaining);
                stage.redirect_to(&attempt);

                let error = match attempt.result().await {
                    Ok((response, got_progress)) => {
                        return Ok(Dispatched {
                            response,
                            got_progress,
                            filter_time,
                            is_head: request.is_head(),
                        })
                    }
                    Err(error) => error,
                };

                if error.is_attempts_exhausted() {
                    // Surface the real failure, not the bookkeeping one.
                    return Err(last_error.unwrap_or(error));
                }
                if error.is_aborted() || !error.is_recoverable() {
                    return Err(error);
                }
                if stage.is_aborted() {
                    return Err(Error::aborted());
                }

                tracing::warn!(
                    uri = %request.uris[index],
                    attempt = backoff.num_attempts(),
                    %request_type,
                    error = %error,
                    "recoverable failure, retrying"
                );
                // A single-attempt request never retries, so it reports none.
                if request.retry_parameters.max_attempts > 1 {
                    inner.listener.on_retry(&error);
                }
                index = (index + 1) % request.uris.len();
                last_error = Some(error);
            }
        };

        AbortableOperation::new(retry_loop, move || latch.abort())
    }

    /// One attempt against `request.uris[index]`: backoff wait, then the
    /// plugin call with connection/stall timers attached.
    fn send(
        self: &Arc<Self>,
        request_type: RequestType,
        request: &mut Request,
        backoff: &mut Backoff,
        index: usize,
        bytes_remaining: &Arc<BytesRemaining>,
    ) -> AbortableOperation<(Response, bool)> {
        let (uri, scheme) = match self.resolve_uri(&request.uris[index]) {
            Ok(resolved) => resolved,
            Err(error) => return AbortableOperation::failed(error),
        };
        request.uris[index] = uri.clone();

        let Some(registration) = self.schemes.get(&scheme) else {
            return AbortableOperation::failed(Error::unsupported_scheme(uri));
        };

        let params = request.retry_parameters;
        let attempt = Attempt::new(
            registration.progress_support,
            params.connection_timeout,
            params.stall_timeout,
        );
        let request = Arc::new(request.clone());
        tracing::debug!(%uri, index, attempt = backoff.num_attempts() + 1, %request_type, "sending");

        let progress_updated: ProgressUpdated = {
            let attempt = Arc::downgrade(&attempt);
            let listener = Arc::clone(&self.listener);
            let bytes_remaining = Arc::clone(bytes_remaining);
            Arc::new(move |elapsed: Duration, bytes: u64, remaining: u64| {
                let Some(attempt) = attempt.upgrade() else {
                    return;
                };
                attempt.on_progress();
                if request_type == RequestType::Segment {
                    listener.on_progress_updated(elapsed, bytes);
                    attempt.got_progress.store(true, Ordering::SeqCst);
                    bytes_remaining.set(remaining);
                }
            })
        };

        let headers_received: HeadersReceived = {
            let attempt = Arc::downgrade(&attempt);
            let listener = Arc::clone(&self.listener);
            let request = Arc::clone(&request);
            Arc::new(move |headers: &HashMap<String, String>| {
                let Some(attempt) = attempt.upgrade() else {
                    return;
                };
                if !attempt.headers_reported.swap(true, Ordering::SeqCst) {
                    listener.on_headers_received(headers, &request, request_type);
                }
            })
        };

        let backoff_operation = AbortableOperation::not_abortable(backoff.attempt());

        let send_operation = {
            let inner = Arc::clone(self);
            let attempt = Arc::clone(&attempt);
            let request = Arc::clone(&request);
            let uri = uri.clone();
            backoff_operation.and_then(move |()| {
                if inner.is_destroyed() {
                    return Ok(Step::Operation(AbortableOperation::aborted()));
                }
                *attempt.started.lock() = Some(Instant::now());
                // Armed before the call so a plugin reporting progress
                // synchronously still disarms it.
                if let Some(timer) = &attempt.connection_timer {
                    timer.tick_after(params.connection_timeout);
                }
                let operation = registration.plugin.request(
                    &uri,
                    &request,
                    request_type,
                    progress_updated,
                    headers_received,
                );
                *attempt.plugin_operation.lock() = Some(operation.clone());
                if attempt.timed_out.load(Ordering::SeqCst) {
                    drop(operation.abort());
                }
                Ok(Step::Operation(operation))
            })
        };

        let on_success = {
            let attempt = Arc::clone(&attempt);
            let listener = Arc::clone(&self.listener);
            let request = Arc::clone(&request);
            move |mut response: Response| {
                attempt.stop_timers();
                if response.time.is_none() {
                    response.time = Some(attempt.elapsed());
                }
                if !attempt.headers_reported.swap(true, Ordering::SeqCst) {
                    listener.on_headers_received(&response.headers, &request, request_type);
                }
                let got_progress = attempt.got_progress.load(Ordering::SeqCst);
                Ok(Step::Value((response, got_progress)))
            }
        };

        let on_error = {
            let inner = Arc::clone(self);
            move |error: Error| {
                attempt.stop_timers();
                let timed_out = attempt.timed_out.load(Ordering::SeqCst);
                if !error.is_attempts_exhausted() {
                    inner
                        .listener
                        .on_download_failed(&request, &error, error.http_status(), timed_out);
                }
                if inner.is_destroyed() {
                    return Err(Error::aborted());
                }
                if timed_out {
                    return Err(Error::timeout(uri, request_type));
                }
                Err(error)
            }
        };

        send_operation.chain(on_success, on_error)
    }

    /// Apply the force-HTTP(S) policies and infer a missing scheme.
    /// Returns the rewritten URI and its lower-cased scheme.
    fn resolve_uri(&self, uri: &str) -> Result<(String, String), Error> {
        let options = self.options.read().clone();
        let mut uri = uri.to_string();
        if options.force_http {
            if let Some(rest) = uri.strip_prefix("https://") {
                uri = format!("http://{rest}");
            }
        }
        if options.force_https {
            if let Some(rest) = uri.strip_prefix("http://") {
                uri = format!("https://{rest}");
            }
        }

        match url::Url::parse(&uri) {
            Ok(parsed) => {
                let scheme = parsed.scheme().to_ascii_lowercase();
                Ok((uri, scheme))
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let scheme = options.location_scheme.to_ascii_lowercase();
                let uri = format!("{scheme}:{uri}");
                Ok((uri, scheme))
            }
            Err(_) => Err(Error::malformed_uri(uri)),
        }
    }
}
