//! `data:` URI plugin (RFC 2397).

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

use crate::error::Error;
use crate::networking::{HeadersReceived, ProgressUpdated, SchemePlugin};
use crate::operation::AbortableOperation;
use crate::request::{Request, RequestType, Response};

/// Standard alphabet, padding optional.
const PAYLOAD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded contents of a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Media type with parameters, e.g. `text/plain;charset=utf-8`. `None`
    /// when the URI omits it.
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Parse `data:[<mediatype>][;base64],<payload>`.
pub fn parse_data_uri(uri: &str) -> Result<DataUri, Error> {
    let malformed = || Error::malformed_data_uri(uri);

    let rest = uri
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .map(|_| &uri[5..])
        .ok_or_else(malformed)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(malformed)?;

    let mut params: Vec<&str> = meta.split(';').collect();
    let base64 = params
        .last()
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("base64"));
    if base64 {
        params.pop();
    }
    let content_type = params.join(";");
    let content_type = (!content_type.trim().is_empty()).then(|| content_type.trim().to_string());

    let decoded: Vec<u8> = percent_decode_str(payload).collect();
    let data = if base64 {
        let compact: Vec<u8> = decoded
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        PAYLOAD_BASE64.decode(compact).map_err(|_| malformed())?
    } else {
        decoded
    };

    Ok(DataUri {
        content_type,
        data: Bytes::from(data),
    })
}

/// Serves `data:` URIs from memory. Never reports progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataUriPlugin;

impl SchemePlugin for DataUriPlugin {
    fn request(
        &self,
        uri: &str,
        _request: &Request,
        _request_type: RequestType,
        _progress_updated: ProgressUpdated,
        headers_received: HeadersReceived,
    ) -> AbortableOperation<Response> {
        let parsed = match parse_data_uri(uri) {
            Ok(parsed) => parsed,
            Err(error) => return AbortableOperation::failed(error),
        };
        let mut headers = HashMap::new();
        if let Some(content_type) = parsed.content_type {
            headers.insert("content-type".to_string(), content_type);
        }
        headers_received(&headers);
        AbortableOperation::completed(Response {
            uri: uri.to_string(),
            original_uri: uri.to_string(),
            data: parsed.data,
            status: Some(200),
            headers,
            time: None,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn plain_text_is_percent_decoded() {
        let parsed = parse_data_uri("data:text/plain;charset=utf-8,hello%20world").unwrap();
        assert_eq!(parsed.content_type.as_deref(), Some("text/plain;charset=utf-8"));
        assert_eq!(parsed.data, Bytes::from_static(b"hello world"));
    }

    #[test]
    fn base64_with_and_without_padding() {
        let padded = parse_data_uri("data:application/octet-stream;base64,aGk=").unwrap();
        assert_eq!(padded.data, Bytes::from_static(b"hi"));
        let unpadded = parse_data_uri("DATA:;base64,aGk").unwrap();
        assert_eq!(unpadded.data, Bytes::from_static(b"hi"));
        assert!(unpadded.content_type.is_none());
    }

    #[test]
    fn empty_media_type_and_payload() {
        let parsed = parse_data_uri("data:,").unwrap();
        assert!(parsed.content_type.is_none());
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn malformed_uris_are_rejected() {
        for uri in ["data:text/plain", "http://x/,y", "data:;base64,@@@", "dat"] {
            let err = parse_data_uri(uri).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::MalformedDataUri { .. }),
                "{uri}: {err}"
            );
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn plugin_serves_payload_with_content_type() {
        let headers_seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let sink = std::sync::Arc::clone(&headers_seen);
        let op = DataUriPlugin.request(
            "data:text/plain,abc",
            &Request::default(),
            RequestType::App,
            std::sync::Arc::new(|_: std::time::Duration, _: u64, _: u64| {}),
            std::sync::Arc::new(move |h: &HashMap<String, String>| {
                *sink.lock() = h.get("content-type").cloned();
            }),
        );
        let response = futures::executor::block_on(op.result()).unwrap();
        assert_eq!(response.data, Bytes::from_static(b"abc"));
        assert_eq!(response.headers["content-type"], "text/plain");
        assert_eq!(headers_seen.lock().as_deref(), Some("text/plain"));
    }
}
