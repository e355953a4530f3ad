//! Pipeline error type: a severity paired with a categorized kind.
//!
//! Every failure that crosses an operation boundary is a [`Error`]. It is
//! `Clone` because a settled operation result may be observed by several
//! waiters (the caller, an abort waiting for settlement, the tracker).

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::request::RequestType;
use crate::retry::classify_http_status;

/// Boxed source error shared between clones of an [`Error`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Whether the retry loop may try again after this error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Eligible for backoff and URI rotation.
    Recoverable,
    /// Terminates the request immediately.
    Critical,
}

/// What went wrong.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    /// The operation was aborted. Never retried, never re-reported.
    #[error("operation aborted")]
    Aborted,

    /// The request carried no candidate URIs.
    #[error("request has no URIs")]
    MissingUri,

    /// The URI could not be parsed far enough to find a scheme.
    #[error("malformed URI {uri}")]
    MalformedUri { uri: String },

    /// No plugin is registered for the URI's scheme.
    #[error("no plugin registered for the scheme of {uri}")]
    UnsupportedScheme { uri: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} from {uri}")]
    BadHttpStatus {
        uri: String,
        status: u16,
        body: Bytes,
        headers: HashMap<String, String>,
        request_type: RequestType,
    },

    /// Transport-level failure (connection refused, reset, DNS, ...).
    #[error("transport failure for {uri}: {message}")]
    HttpError { uri: String, message: String },

    /// No bytes arrived in time, or the transfer stalled.
    #[error("request to {uri} timed out")]
    Timeout { uri: String, request_type: RequestType },

    #[error("malformed data URI {uri}")]
    MalformedDataUri { uri: String },

    /// The retry scheduler has no attempts left. Internal: the pipeline
    /// replaces it with the last real failure before surfacing.
    #[error("retry attempts exhausted")]
    AttemptsExhausted,

    #[error("request filter failed: {0}")]
    RequestFilter(#[source] SharedError),

    #[error("response filter failed: {0}")]
    ResponseFilter(#[source] SharedError),
}

/// Error surfaced by operations, plugins and the networking engine.
#[derive(Debug, Clone)]
pub struct Error {
    severity: Severity,
    kind: ErrorKind,
}

impl Error {
    pub fn new(severity: Severity, kind: ErrorKind) -> Self {
        Self { severity, kind }
    }

    /// The canonical abort error.
    pub fn aborted() -> Self {
        Self::new(Severity::Critical, ErrorKind::Aborted)
    }

    pub fn missing_uri() -> Self {
        Self::new(Severity::Critical, ErrorKind::MissingUri)
    }

    pub fn malformed_uri(uri: impl Into<String>) -> Self {
        Self::new(Severity::Critical, ErrorKind::MalformedUri { uri: uri.into() })
    }

    pub fn unsupported_scheme(uri: impl Into<String>) -> Self {
        Self::new(
            Severity::Critical,
            ErrorKind::UnsupportedScheme { uri: uri.into() },
        )
    }

    /// Bad status; 401 and 403 are critical, everything else recoverable.
    pub fn bad_http_status(
        uri: impl Into<String>,
        status: u16,
        body: Bytes,
        headers: HashMap<String, String>,
        request_type: RequestType,
    ) -> Self {
        Self::new(
            classify_http_status(status),
            ErrorKind::BadHttpStatus {
                uri: uri.into(),
                status,
                body,
                headers,
                request_type,
            },
        )
    }

    pub fn http_error(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            Severity::Recoverable,
            ErrorKind::HttpError {
                uri: uri.into(),
                message: message.into(),
            },
        )
    }

    pub fn timeout(uri: impl Into<String>, request_type: RequestType) -> Self {
        Self::new(
            Severity::Recoverable,
            ErrorKind::Timeout {
                uri: uri.into(),
                request_type,
            },
        )
    }

    pub fn malformed_data_uri(uri: impl Into<String>) -> Self {
        Self::new(
            Severity::Critical,
            ErrorKind::MalformedDataUri { uri: uri.into() },
        )
    }

    pub fn attempts_exhausted() -> Self {
        Self::new(Severity::Critical, ErrorKind::AttemptsExhausted)
    }

    /// Wrap whatever a request filter returned. An abort passes through verbatim.
    pub fn request_filter(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) if inner.is_aborted() => inner,
            Ok(inner) => Self::new(
                Severity::Critical,
                ErrorKind::RequestFilter(Arc::new(inner)),
            ),
            Err(other) => Self::new(Severity::Critical, ErrorKind::RequestFilter(shared(other))),
        }
    }

    /// Wrap whatever a response filter returned. An abort passes through verbatim.
    pub fn response_filter(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) if inner.is_aborted() => inner,
            Ok(inner) => Self::new(
                Severity::Critical,
                ErrorKind::ResponseFilter(Arc::new(inner)),
            ),
            Err(other) => Self::new(Severity::Critical, ErrorKind::ResponseFilter(shared(other))),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.kind, ErrorKind::Aborted)
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity == Severity::Recoverable
    }

    pub fn is_attempts_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::AttemptsExhausted)
    }

    /// Status code carried by a bad-status error.
    pub fn http_status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::BadHttpStatus { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Same error, marked critical. Applied to everything that leaves the pipeline.
    pub fn into_critical(mut self) -> Self {
        self.severity = Severity::Critical;
        self
    }
}

fn shared(err: anyhow::Error) -> SharedError {
    let boxed: Box<dyn std::error::Error + Send + Sync> = err.into();
    Arc::from(boxed)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}
