//! Request pipeline: scheme plugins, filters, retry loop and teardown.
//!
//! A call to [`NetworkingEngine::request`] builds one outer operation that
//! spans request filters → transport attempts → response filters:
//!
//! ```text
//! filters (chained) ─► retry loop ─► response filters ─► timing/telemetry
//!                       │
//!                       └─ per attempt: backoff wait ─► plugin call (+ timers)
//! ```
//!
//! Aborting the returned [`PendingRequest`] cancels whichever stage is live.

mod filters;
mod listener;
mod pending;
mod registry;
mod send;
mod tracker;


use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::MedianetConfig;
use crate::error::Error;
use crate::operation::{AbortableOperation, Step};
use crate::request::{Request, RequestType, Response};

pub use filters::{RequestFilter, ResponseFilter};
pub use listener::{NetworkListener, NoopListener};
pub use pending::{BytesRemaining, PendingRequest};
pub use registry::{
    HeadersReceived, PluginPriority, ProgressUpdated, SchemePlugin, SchemeRegistration,
    SchemeRegistry,
};

use filters::FilterSet;
use send::Dispatched;
use tracker::OperationTracker;

/// URI policies applied to every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Rewrite `http://` URIs to `https://`. Wins over `force_http`.
    pub force_https: bool,
    /// Rewrite `https://` URIs to `http://`.
    pub force_http: bool,
    /// Scheme assumed for scheme-relative URIs (`//host/path`).
    pub location_scheme: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            force_https: false,
            force_http: false,
            location_scheme: "https".to_string(),
        }
    }
}

/// The dispatcher. Cheap to clone; clones share registry, filters and state.
#[derive(Clone)]
pub struct NetworkingEngine {
    inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    schemes: SchemeRegistry,
    request_filters: FilterSet<dyn RequestFilter>,
    response_filters: FilterSet<dyn ResponseFilter>,
    listener: Arc<dyn NetworkListener>,
    options: RwLock<EngineOptions>,
    destroyed: AtomicBool,
    tracker: Arc<OperationTracker>,
}

impl NetworkingEngine {
    /// An engine with an empty scheme registry.
    pub fn new(options: EngineOptions, listener: Arc<dyn NetworkListener>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                schemes: SchemeRegistry::new(),
                request_filters: FilterSet::default(),
                response_filters: FilterSet::default(),
                listener,
                options: RwLock::new(options),
                destroyed: AtomicBool::new(false),
                tracker: Arc::new(OperationTracker::default()),
            }),
        }
    }

    /// An engine with the built-in `http`, `https` and `data` plugins.
    pub fn with_default_plugins(options: EngineOptions, listener: Arc<dyn NetworkListener>) -> Self {
        let engine = Self::new(options, listener);
        crate::plugins::register_default_plugins(engine.schemes());
        engine
    }

    /// Default plugins with the URI policies from `config`.
    pub fn from_config(config: &MedianetConfig, listener: Arc<dyn NetworkListener>) -> Self {
        Self::with_default_plugins(config.engine_options(), listener)
    }

    pub fn schemes(&self) -> &SchemeRegistry {
        &self.inner.schemes
    }

    /// See [`SchemeRegistry::register`].
    pub fn register_scheme(
        &self,
        scheme: &str,
        plugin: Arc<dyn SchemePlugin>,
        priority: Option<PluginPriority>,
        progress_support: bool,
    ) -> bool {
        self.inner
            .schemes
            .register(scheme, plugin, priority, progress_support)
    }

    pub fn unregister_scheme(&self, scheme: &str) -> bool {
        self.inner.schemes.unregister(scheme)
    }

    pub fn register_request_filter(&self, filter: Arc<dyn RequestFilter>) -> bool {
        self.inner.request_filters.insert(filter)
    }

    pub fn unregister_request_filter(&self, filter: &Arc<dyn RequestFilter>) -> bool {
        self.inner.request_filters.remove(filter)
    }

    pub fn clear_all_request_filters(&self) {
        self.inner.request_filters.clear();
    }

    pub fn register_response_filter(&self, filter: Arc<dyn ResponseFilter>) -> bool {
        self.inner.response_filters.insert(filter)
    }

    pub fn unregister_response_filter(&self, filter: &Arc<dyn ResponseFilter>) -> bool {
        self.inner.response_filters.remove(filter)
    }

    pub fn clear_all_response_filters(&self) {
        self.inner.response_filters.clear();
    }

    pub fn set_force_https(&self, force_https: bool) {
        self.inner.options.write().force_https = force_https;
    }

    pub fn set_force_http(&self, force_http: bool) {
        self.inner.options.write().force_http = force_http;
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options.read().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Number of requests that have not settled yet.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Dispatch `request`. Must be called from within a Tokio runtime.
    ///
    /// The request is taken by value: filters mutate this copy only, and
    /// the caller's retry parameters and URI list are never touched.
    pub fn request(&self, request_type: RequestType, mut request: Request) -> PendingRequest {
        let bytes_remaining = Arc::new(BytesRemaining::default());
        if self.inner.is_destroyed() {
            return PendingRequest::new(AbortableOperation::aborted(), bytes_remaining);
        }
        if request.uris.is_empty() {
            return PendingRequest::new(
                AbortableOperation::failed(Error::missing_uri()),
                bytes_remaining,
            );
        }
        if request.method.is_empty() {
            request.method = "GET".to_string();
        }
        tracing::debug!(%request_type, uri = %request.uris[0], method = %request.method, "request");

        let filters_started = Instant::now();
        let inner = Arc::clone(&self.inner);
        let remaining = Arc::clone(&bytes_remaining);
        let request_operation = self.inner.filter_request(request_type, request).and_then(
            move |request| {
                let filter_time = filters_started.elapsed();
                Ok(Step::Operation(inner.make_request_with_retry(
                    request_type,
                    request,
                    remaining,
                    filter_time,
                )))
            },
        );

        let inner = Arc::clone(&self.inner);
        let response_operation = request_operation
            .and_then(move |dispatched: Dispatched| {
                let started = Instant::now();
                let listener = Arc::clone(&inner.listener);
                let filtered = inner.filter_response(request_type, dispatched.response);
                Ok(Step::Operation(filtered.and_then(move |mut response| {
                    let time = response.time.unwrap_or_default()
                        + dispatched.filter_time
                        + started.elapsed();
                    response.time = Some(time);
                    if !dispatched.got_progress
                        && request_type == RequestType::Segment
                        && !response.from_cache
                        && !dispatched.is_head
                    {
                        listener.on_progress_updated(time, response.data.len() as u64);
                    }
                    Ok(Step::Value(response))
                })))
            })
            // Nothing above the pipeline retries, so whatever escapes it is critical.
            .chain(|response| Ok(Step::Value(response)), |error| Err(error.into_critical()));

        self.inner.tracker.manage(&response_operation);
        PendingRequest::new(response_operation, bytes_remaining)
    }

    /// Tear the engine down: abort every in-flight request, wait for them to
    /// settle, and fail all future `request()` calls immediately.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(in_flight = self.inner.tracker.len(), "destroying networking engine");
        self.inner.request_filters.clear();
        self.inner.response_filters.clear();
        self.inner.tracker.abort_all().await;
    }
}

impl EngineInner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Run request filters in registration order, each as its own stage.
    fn filter_request(&self, request_type: RequestType, request: Request) -> AbortableOperation<Request> {
        let mut operation = AbortableOperation::completed(request);
        for filter in self.request_filters.snapshot() {
            operation = operation.and_then(move |mut request| {
                Ok(Step::future(async move {
                    filter
                        .filter(request_type, &mut request)
                        .await
                        .map_err(Error::request_filter)?;
                    Ok(request)
                }))
            });
        }
        operation
    }

    /// Run response filters in registration order, each as its own stage.
    fn filter_response(&self, request_type: RequestType, response: Response) -> AbortableOperation<Response> {
        let mut operation = AbortableOperation::completed(response);
        for filter in self.response_filters.snapshot() {
            operation = operation.and_then(move |mut response| {
                Ok(Step::future(async move {
                    filter
                        .filter(request_type, &mut response)
                        .await
                        .map_err(Error::response_filter)?;
                    Ok(response)
                }))
            });
        }
        operation
    }
}
