//! `medianet fetch` – dispatch one request through the pipeline.

use anyhow::{Context, Result};
use medianet_core::config::MedianetConfig;
use medianet_core::networking::{NetworkListener, NetworkingEngine};
use medianet_core::{make_request, Error, Request, RequestType};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct FetchArgs {
    pub uris: Vec<String>,
    pub request_type: RequestType,
    pub max_attempts: Option<u32>,
    pub output: Option<PathBuf>,
    pub force_https: bool,
}

/// Logs pipeline events; the CLI has no bandwidth estimator to feed.
struct LogListener;

impl NetworkListener for LogListener {
    fn on_progress_updated(&self, elapsed: Duration, bytes: u64) {
        tracing::trace!(elapsed_ms = millis(elapsed), bytes, "progress");
    }

    fn on_download_failed(&self, request: &Request, error: &Error, status: Option<u16>, timed_out: bool) {
        tracing::debug!(uris = ?request.uris, ?status, timed_out, %error, "attempt failed");
    }

    fn on_retry(&self, error: &Error) {
        eprintln!("retrying after: {error}");
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub async fn run_fetch(cfg: &MedianetConfig, args: FetchArgs) -> Result<()> {
    let engine = NetworkingEngine::from_config(cfg, Arc::new(LogListener));
    if args.force_https {
        engine.set_force_https(true);
    }

    let mut params = cfg.retry_parameters();
    if let Some(n) = args.max_attempts {
        params.max_attempts = n;
    }
    let request = make_request(args.uris, params);
    let pending = engine.request(args.request_type, request);

    let outcome = tokio::select! {
        outcome = pending.response() => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted, aborting request");
            pending.abort().await;
            pending.response().await
        }
    };
    engine.destroy().await;
    let response = outcome?;

    let elapsed_ms = millis(response.time.unwrap_or_default());
    match args.output {
        Some(path) => {
            std::fs::write(&path, &response.data)
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "{} bytes from {} written to {} in {} ms",
                response.data.len(),
                response.uri,
                path.display(),
                elapsed_ms
            );
        }
        None => {
            let status = response
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} {} {} bytes in {} ms",
                status,
                response.uri,
                response.data.len(),
                elapsed_ms
            );
            let mut headers: Vec<_> = response.headers.iter().collect();
            headers.sort();
            for (name, value) in headers {
                println!("  {name}: {value}");
            }
        }
    }
    Ok(())
}
