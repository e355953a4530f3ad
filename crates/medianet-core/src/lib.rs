//! Network request pipeline for a streaming media player.
//!
//! Requests go through pluggable URI-scheme transports, ordered request and
//! response filters, and a retry loop with fuzzed exponential backoff that
//! rotates across candidate URIs. Every stage is an [`AbortableOperation`], so
//! one `abort()` on the handle returned by [`NetworkingEngine::request`]
//! cancels whatever is in progress.

pub mod config;
pub mod error;
pub mod logging;
pub mod networking;
pub mod operation;
pub mod plugins;
pub mod request;
pub mod retry;
pub mod timer;

pub use error::{Error, ErrorKind, Severity};
pub use networking::{
    EngineOptions, NetworkListener, NetworkingEngine, PendingRequest, PluginPriority,
    SchemePlugin,
};
pub use operation::{AbortableOperation, OperationResult, Step};
pub use request::{make_request, Request, RequestType, Response};
pub use retry::{default_retry_parameters, Backoff, RetryParameters};
