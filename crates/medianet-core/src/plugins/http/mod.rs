//! `http`/`https` transport over libcurl.
//!
//! Each request runs one curl easy handle on Tokio's blocking pool. Abort sets
//! a shared flag that curl's progress and write callbacks check, so the
//! transfer stops at the next callback (at least once a second while idle).

mod parse;

use bytes::Bytes;
use futures::FutureExt;
use std::cell::RefCell;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::networking::{HeadersReceived, ProgressUpdated, SchemePlugin};
use crate::operation::AbortableOperation;
use crate::request::{Request, RequestType, Response};

/// libcurl-backed plugin. Reports progress; honors
/// [`RetryParameters::timeout`](crate::retry::RetryParameters::timeout) as the
/// whole-transfer limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpPlugin;

impl SchemePlugin for HttpPlugin {
    fn request(
        &self,
        uri: &str,
        request: &Request,
        request_type: RequestType,
        progress_updated: ProgressUpdated,
        headers_received: HeadersReceived,
    ) -> AbortableOperation<Response> {
        let transfer = HttpTransfer {
            uri: uri.to_string(),
            method: request.method.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| format!("{}: {}", k.trim(), v.trim()))
                .collect(),
            body: request.body.clone(),
            timeout: request.retry_parameters.timeout,
            request_type,
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let done = CancellationToken::new();
        let job = {
            let cancel = Arc::clone(&cancel);
            let done = done.clone();
            tokio::task::spawn_blocking(move || {
                let _settled = done.drop_guard();
                transfer.perform(&cancel, &progress_updated, &headers_received)
            })
        };

        AbortableOperation::new(
            async move {
                match job.await {
                    Ok(outcome) => outcome,
                    Err(join_error) if join_error.is_panic() => {
                        std::panic::resume_unwind(join_error.into_panic())
                    }
                    Err(_) => Err(Error::aborted()),
                }
            },
            move || {
                cancel.store(true, Ordering::SeqCst);
                done.clone().cancelled_owned().boxed()
            },
        )
    }
}

struct HttpTransfer {
    uri: String,
    method: String,
    headers: Vec<String>,
    body: Option<Bytes>,
    timeout: Duration,
    request_type: RequestType,
}

impl HttpTransfer {
    fn configure(&self, easy: &mut curl::easy::Easy) -> Result<(), curl::Error> {
        easy.url(&self.uri)?;
        easy.follow_location(true)?;
        // Needed for the progress callback (abort checks and byte counts).
        easy.progress(true)?;
        if !self.timeout.is_zero() {
            easy.timeout(self.timeout)?;
        }

        let method = self.method.to_ascii_uppercase();
        match method.as_str() {
            "" | "GET" => easy.get(true)?,
            "HEAD" => easy.nobody(true)?,
            "POST" => easy.post(true)?,
            other => easy.custom_request(other)?,
        }
        if let Some(body) = &self.body {
            if !matches!(method.as_str(), "" | "GET" | "HEAD") {
                easy.post_fields_copy(body)?;
            }
        }

        if !self.headers.is_empty() {
            let mut list = curl::easy::List::new();
            for header in &self.headers {
                list.append(header)?;
            }
            easy.http_headers(list)?;
        }
        Ok(())
    }

    /// Blocking; runs on the blocking pool.
    fn perform(
        self,
        cancel: &AtomicBool,
        progress_updated: &ProgressUpdated,
        headers_received: &HeadersReceived,
    ) -> Result<Response, Error> {
        let mut easy = curl::easy::Easy::new();
        self.configure(&mut easy)
            .map_err(|e| Error::http_error(&self.uri, e.to_string()))?;

        let header_lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let headers_sent = RefCell::new(false);
        let mut data: Vec<u8> = Vec::new();
        let mut last_sample = Instant::now();
        let mut last_bytes = 0u64;

        tracing::trace!(uri = %self.uri, method = %self.method, "curl transfer starting");
        let performed = {
            let mut transfer = easy.transfer();
            let configured = transfer
                .header_function(|line| {
                    if let Ok(s) = str::from_utf8(line) {
                        header_lines.borrow_mut().push(s.trim_end().to_string());
                    }
                    true
                })
                .and_then(|()| {
                    transfer.write_function(|chunk| {
                        if cancel.load(Ordering::SeqCst) {
                            // Short write makes curl fail the transfer.
                            return Ok(0);
                        }
                        if !headers_sent.replace(true) {
                            headers_received(&parse::parse_headers(&header_lines.borrow()));
                        }
                        data.extend_from_slice(chunk);
                        Ok(chunk.len())
                    })
                })
                .and_then(|()| {
                    transfer.progress_function(|dltotal, dlnow, _, _| {
                        if cancel.load(Ordering::SeqCst) {
                            return false;
                        }
                        let now = dlnow.max(0.0) as u64;
                        if now > last_bytes {
                            let remaining = (dltotal - dlnow).max(0.0) as u64;
                            progress_updated(last_sample.elapsed(), now - last_bytes, remaining);
                            last_sample = Instant::now();
                            last_bytes = now;
                        }
                        true
                    })
                });
            configured.and_then(|()| transfer.perform())
        };

        if let Err(e) = performed {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::aborted());
            }
            if e.is_operation_timedout() {
                return Err(Error::timeout(&self.uri, self.request_type));
            }
            return Err(Error::http_error(&self.uri, e.to_string()));
        }

        let status = easy
            .response_code()
            .map_err(|e| Error::http_error(&self.uri, e.to_string()))?;
        let final_uri = easy
            .effective_url()
            .ok()
            .flatten()
            .map(str::to_string)
            .unwrap_or_else(|| self.uri.clone());
        let headers = parse::parse_headers(&header_lines.into_inner());
        let status = u16::try_from(status).unwrap_or(0);
        tracing::debug!(uri = %final_uri, status, bytes = data.len(), "curl transfer finished");

        if !(200..300).contains(&status) {
            return Err(Error::bad_http_status(
                final_uri,
                status,
                Bytes::from(data),
                headers,
                self.request_type,
            ));
        }

        Ok(Response {
            uri: final_uri,
            original_uri: self.uri,
            data: Bytes::from(data),
            status: Some(status),
            headers,
            time: None,
            from_cache: false,
        })
    }
}
