//! Minimal HTTP/1.1 server with scripted routes for integration tests.
//!
//! Routes:
//! - `/ok`            200 with the configured body
//! - `/status/<code>` empty response with that status
//! - `/flaky/<n>`     503 for the first `n` hits, then 200 with the body
//! - `/slow/<ms>`     waits `ms` before answering 200
//! - `/echo-header`   200 whose body is the request's `x-token` header
//! - `/echo-body`     200 whose body is the request body

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone)]
pub struct MediaServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MediaServer {
    /// `http://127.0.0.1:<port>` + `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of requests served for `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

/// Starts a server in a background thread serving `body` on the success
/// routes. The server runs until the process exits.
pub fn start(body: Vec<u8>) -> MediaServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let hits = Arc::new(Mutex::new(HashMap::new()));
    let server_hits = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let hits = Arc::clone(&server_hits);
            thread::spawn(move || handle(stream, &body, &hits));
        }
    });
    MediaServer {
        base: format!("http://127.0.0.1:{}", port),
        hits,
    }
}

struct ParsedRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn handle(mut stream: TcpStream, body: &[u8], hits: &Mutex<HashMap<String, usize>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let hit = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(request.path.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
    let (status, payload): (&str, Vec<u8>) = match segments.as_slice() {
        ["ok"] => ("200 OK", body.to_vec()),
        ["status", code] => (status_line(code), Vec::new()),
        ["flaky", n] => {
            let failures: usize = n.parse().unwrap_or(0);
            if hit <= failures {
                ("503 Service Unavailable", Vec::new())
            } else {
                ("200 OK", body.to_vec())
            }
        }
        ["slow", ms] => {
            thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
            ("200 OK", body.to_vec())
        }
        ["echo-header"] => (
            "200 OK",
            request
                .headers
                .get("x-token")
                .cloned()
                .unwrap_or_default()
                .into_bytes(),
        ),
        ["echo-body"] => ("200 OK", request.body.clone()),
        _ => ("404 Not Found", Vec::new()),
    };

    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nX-Hit: {}\r\nConnection: close\r\n\r\n",
        status,
        payload.len(),
        hit
    );
    let _ = stream.write_all(head.as_bytes());
    if !request.method.eq_ignore_ascii_case("HEAD") {
        let _ = stream.write_all(&payload);
    }
}

fn status_line(code: &str) -> &'static str {
    match code {
        "401" => "401 Unauthorized",
        "403" => "403 Forbidden",
        "404" => "404 Not Found",
        "500" => "500 Internal Server Error",
        "503" => "503 Service Unavailable",
        _ => "200 OK",
    }
}

fn read_request(stream: &mut TcpStream) -> Option<ParsedRequest> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = std::str::from_utf8(&raw[..header_end]).ok()?;
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = raw[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Some(ParsedRequest {
        method,
        path,
        headers,
        body,
    })
}
