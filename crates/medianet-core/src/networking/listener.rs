//! Callbacks raised toward collaborators (bandwidth estimation, analytics).

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;
use crate::request::{Request, RequestType};

/// Observer of pipeline activity. Every method defaults to a no-op.
pub trait NetworkListener: Send + Sync {
    /// A segment transfer made progress: time and bytes since the last sample.
    fn on_progress_updated(&self, _elapsed: Duration, _bytes: u64) {}

    fn on_headers_received(
        &self,
        _headers: &HashMap<String, String>,
        _request: &Request,
        _request_type: RequestType,
    ) {
    }

    /// An attempt failed. `timed_out` is set when one of the engine's own
    /// connection/stall timers aborted it.
    fn on_download_failed(
        &self,
        _request: &Request,
        _error: &Error,
        _http_status: Option<u16>,
        _timed_out: bool,
    ) {
    }

    /// The engine is rotating to the next URI after a recoverable failure.
    fn on_retry(&self, _error: &Error) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl NetworkListener for NoopListener {}
