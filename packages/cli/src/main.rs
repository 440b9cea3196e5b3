//! Ripline CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

use actors::{SystemError, start_conversion_system};
use clap::{Parser, Subcommand};
use extractor::Extractor;
use ripline_core::{ConfigError, JobError, JobRequest, RiplineConfig, SessionId, Stage};
use storage::StorageError;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ripline=info,actors=info,extractor=info,storage=info";

/// Ripline - media conversion job runner
#[derive(Debug, Parser)]
#[command(name = "ripline", version, about, long_about = None)]
struct Cli {
    /// Output root (overrides RIPLINE_OUTPUT_DIR)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a reference and print progress events as JSON lines
    Fetch {
        /// Content reference handed to the extraction utility
        reference: String,

        /// Title used to name the deliverable
        #[arg(short, long, default_value = "download")]
        title: String,
    },
    /// Check that the extraction utility can be invoked
    Probe,
    /// Delete expired entries from the output root once
    Sweep,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("progress stream ended before the job finished")]
    StreamClosed,
}

impl Cli {
    async fn execute(self) -> Result<ExitCode, CliError> {
        let mut config = RiplineConfig::from_env()?;
        if let Some(dir) = self.output_dir {
            config.output_root = dir;
        }

        match self.command {
            Commands::Fetch { reference, title } => fetch(config, reference, title).await,
            Commands::Probe => {
                let version = Extractor::new(config.extractor)?.probe().await?;
                println!("{version}");
                Ok(ExitCode::SUCCESS)
            }
            Commands::Sweep => {
                let report =
                    storage::sweep_expired(&config.output_root, config.retention, SystemTime::now())
                        .await?;
                println!(
                    "scanned {} removed {} failed {}",
                    report.scanned, report.removed, report.failed
                );
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

async fn fetch(
    config: RiplineConfig,
    reference: String,
    title: String,
) -> Result<ExitCode, CliError> {
    let (ripline, handle) = start_conversion_system(config).await?;

    let session = SessionId::new(format!("cli-{}", std::process::id()));
    let mut events = ripline.subscribe(&session).await?;
    let job_id = ripline
        .submit(JobRequest::new(reference, session, title))
        .await?;
    tracing::info!(%job_id, "Submitted job");

    let mut code = Err(CliError::StreamClosed);
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.is_terminal() {
            code = Ok(if event.stage == Stage::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
            break;
        }
    }

    ripline.shutdown().await?;
    let _ = handle.await;
    code
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
