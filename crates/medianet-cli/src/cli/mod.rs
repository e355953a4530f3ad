//! CLI for the medianet request pipeline.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use medianet_core::config;
use medianet_core::RequestType;
use std::path::PathBuf;

use commands::{run_config, run_fetch, FetchArgs};

/// Top-level CLI for medianet.
#[derive(Debug, Parser)]
#[command(name = "medianet")]
#[command(about = "medianet: media request pipeline with retries, failover and timeouts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch a resource through the pipeline, failing over across URIs.
    Fetch {
        /// Candidate URIs, tried in order on recoverable failures.
        #[arg(required = true)]
        uris: Vec<String>,

        /// Request type, which controls progress reporting and error context.
        #[arg(long = "type", value_enum, default_value = "segment")]
        request_type: RequestKind,

        /// Override the configured maximum number of attempts.
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,

        /// Write the payload to this file instead of printing a summary.
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Rewrite http:// URIs to https:// for this fetch.
        #[arg(long)]
        force_https: bool,
    },

    /// Show the configuration file path and effective values.
    Config,
}

/// Request types accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RequestKind {
    Manifest,
    Segment,
    License,
    App,
    Timing,
    ServerCertificate,
    Key,
}

impl From<RequestKind> for RequestType {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Manifest => RequestType::Manifest,
            RequestKind::Segment => RequestType::Segment,
            RequestKind::License => RequestType::License,
            RequestKind::App => RequestType::App,
            RequestKind::Timing => RequestType::Timing,
            RequestKind::ServerCertificate => RequestType::ServerCertificate,
            RequestKind::Key => RequestType::Key,
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                uris,
                request_type,
                max_attempts,
                output,
                force_https,
            } => {
                let args = FetchArgs {
                    uris,
                    request_type: request_type.into(),
                    max_attempts,
                    output,
                    force_https,
                };
                run_fetch(&cfg, args).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
