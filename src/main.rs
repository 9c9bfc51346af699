mod cmd;
mod config;
mod error;
mod images;
mod progress;
mod spec;
mod tree;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::AppConfig;

#[derive(Parser)]
#[command(name = "buildtools")]
#[command(about = "Provides build tools for CI build agents")]
#[command(version)]
struct Cli {
    /// Output file (default: stdout)
    #[arg(long, short, global = true)]
    out: Option<PathBuf>,

    /// Executable used to list local images (docker, podman)
    #[arg(long, global = true, env = "BUILDTOOLS_DOCKER", default_value = config::DEFAULT_DOCKER)]
    docker: String,

    /// Abort after this many seconds
    #[arg(long, global = true, env = "BUILDTOOLS_TIMEOUT", value_name = "SECS")]
    timeout: Option<u64>,

    /// More log output on stderr (repeat for more)
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors and hide progress
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate values.yaml files from local docker images.
    ///
    /// The following example maps image.tag to the digest of the most recently
    /// built image named docker.io/example-image:12345
    ///
    ///     buildtools scrapbook --value image.tag=docker.io/example-image:12345
    Scrapbook {
        /// A value to include, as key=repository[:tag][=handler]. Example: image.tag=docker/repository:tag
        #[arg(long = "value", short = 'v', required = true)]
        values: Vec<String>,

        /// Label used to filter images by. Example: build=12345
        #[arg(long = "label", short = 'l')]
        labels: Vec<String>,

        /// Write JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Scrapbook {
            values,
            labels,
            json,
        } => {
            let cfg = AppConfig::from_cli(cli.docker, cli.timeout, cli.out, json, cli.quiet);
            let cancel = CancellationToken::new();
            cmd::spawn_cancellation(cancel.clone(), cfg.timeout);
            cmd::scrapbook::run(&cfg, &values, &labels, &cancel).await
        }
    }
}

/// Logs go to stderr so they never mix with the generated document.
fn init_tracing(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
