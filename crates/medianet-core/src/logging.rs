//! Tracing setup for the `medianet` binary.
//!
//! Events go to `$XDG_STATE_HOME/medianet/medianet.log`; when that file
//! cannot be opened the caller falls back to [`init_logging_stderr`].

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info,medianet_core=debug,medianet=debug";

const LOG_FILE: &str = "medianet.log";

/// Log to the XDG state log file. Errors leave no subscriber installed.
pub fn init_logging() -> Result<()> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("medianet")?;
    let (path, file) = open_log_file(&xdg_dirs.get_state_home())?;

    install(Mutex::new(file));
    tracing::info!("medianet logging to {}", path.display());
    Ok(())
}

pub fn init_logging_stderr() {
    install(std::io::stderr);
}

/// Create `dir` if needed and open its log file for appending.
fn open_log_file(dir: &Path) -> Result<(PathBuf, File)> {
    fs::create_dir_all(dir).with_context(|| format!("creating log dir {}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok((path, file))
}

fn install<W>(writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn log_file_is_created_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");

        let (path, file) = open_log_file(&state).unwrap();
        assert_eq!(path, state.join(LOG_FILE));
        let writer = Mutex::new(file);
        writer.make_writer().write_all(b"first\n").unwrap();

        let (_, file) = open_log_file(&state).unwrap();
        Mutex::new(file).make_writer().write_all(b"second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
