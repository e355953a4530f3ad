//! Request and response filters.

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::request::{Request, RequestType, Response};

/// Rewrites a request before it is dispatched (auth headers, URL signing, ...).
/// Returning an error fails the request with a critical request-filter error.
pub trait RequestFilter: Send + Sync {
    fn filter<'a>(
        &'a self,
        request_type: RequestType,
        request: &'a mut Request,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Inspects or rewrites a response before it reaches the caller.
pub trait ResponseFilter: Send + Sync {
    fn filter<'a>(
        &'a self,
        request_type: RequestType,
        response: &'a mut Response,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

impl<F> RequestFilter for F
where
    F: Fn(RequestType, &mut Request) -> anyhow::Result<()> + Send + Sync,
{
    fn filter<'a>(
        &'a self,
        request_type: RequestType,
        request: &'a mut Request,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        future::ready(self(request_type, request)).boxed()
    }
}

impl<F> ResponseFilter for F
where
    F: Fn(RequestType, &mut Response) -> anyhow::Result<()> + Send + Sync,
{
    fn filter<'a>(
        &'a self,
        request_type: RequestType,
        response: &'a mut Response,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        future::ready(self(request_type, response)).boxed()
    }
}

/// Ordered set of filters; registering the same `Arc` twice is a no-op.
pub(crate) struct FilterSet<F: ?Sized> {
    filters: RwLock<Vec<Arc<F>>>,
}

impl<F: ?Sized> Default for FilterSet<F> {
    fn default() -> Self {
        Self {
            filters: RwLock::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> FilterSet<F> {
    pub(crate) fn insert(&self, filter: Arc<F>) -> bool {
        let mut filters = self.filters.write();
        if filters.iter().any(|f| Arc::ptr_eq(f, &filter)) {
            return false;
        }
        filters.push(filter);
        true
    }

    pub(crate) fn remove(&self, filter: &Arc<F>) -> bool {
        let mut filters = self.filters.write();
        let before = filters.len();
        filters.retain(|f| !Arc::ptr_eq(f, filter));
        filters.len() != before
    }

    pub(crate) fn clear(&self) {
        self.filters.write().clear();
    }

    /// Filters in registration order, as of now. Later registrations do not
    /// affect a request already holding a snapshot.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.filters.read().clone()
    }
}
