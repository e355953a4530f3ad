//! Request and response values exchanged with scheme plugins and filters.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::retry::RetryParameters;

/// What a request is for. Consumers (bandwidth estimation, logging) key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Manifest,
    Segment,
    License,
    App,
    Timing,
    ServerCertificate,
    Key,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Manifest => "manifest",
            RequestType::Segment => "segment",
            RequestType::License => "license",
            RequestType::App => "app",
            RequestType::Timing => "timing",
            RequestType::ServerCertificate => "server-certificate",
            RequestType::Key => "key",
        };
        f.write_str(name)
    }
}

/// A logical request. Filters may rewrite any field before dispatch.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Candidate URIs, tried round-robin on recoverable failure.
    pub uris: Vec<String>,
    /// HTTP method; empty means `GET`.
    pub method: String,
    pub body: Option<Bytes>,
    pub headers: HashMap<String, String>,
    pub allow_cross_site_credentials: bool,
    pub retry_parameters: RetryParameters,

    // Pass-through fields for the DRM layer; never inspected here.
    pub license_request_type: Option<String>,
    pub session_id: Option<String>,
    pub init_data_type: Option<String>,
    pub init_data: Option<Bytes>,
}

impl Request {
    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// Build a `GET` request for the given candidate URIs.
pub fn make_request<I, S>(uris: I, retry_parameters: RetryParameters) -> Request
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Request {
        uris: uris.into_iter().map(Into::into).collect(),
        method: "GET".to_string(),
        retry_parameters,
        ..Request::default()
    }
}

/// Result of one successful attempt.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// URI actually fetched (after redirects).
    pub uri: String,
    /// URI the attempt was made against.
    pub original_uri: String,
    pub data: Bytes,
    pub status: Option<u16>,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    /// Time spent producing the response. Filled in by the engine when the
    /// plugin leaves it empty, then extended with time spent in filters.
    pub time: Option<Duration>,
    pub from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_request_defaults_to_get() {
        let r = make_request(["https://a/x", "https://b/x"], RetryParameters::default());
        assert_eq!(r.uris, vec!["https://a/x", "https://b/x"]);
        assert_eq!(r.method, "GET");
        assert!(r.body.is_none());
        assert!(!r.is_head());
    }

    #[test]
    fn head_detection_ignores_case() {
        let r = Request {
            method: "head".into(),
            ..Request::default()
        };
        assert!(r.is_head());
    }
}
