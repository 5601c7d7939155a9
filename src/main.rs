//! Postal Monitor
//!
//! Run with: postal-monitor [--once | --test-email] [-c CONFIG]
//!
//! Configuration is read from the `--config` path (or `POSTAL_MONITOR_CONFIG`),
//! then `/etc/postal-monitor/config.toml`, then `./config.toml`.
//!
//! Environment variables:
//! - RUST_LOG: Log filter (default: postal_monitor=info)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use postal_monitor::config::MonitorConfig;
use postal_monitor::service::{self, RunMode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "postal-monitor",
    version,
    about = "Email alerts for failed deliveries on a Postal mail server"
)]
struct Cli {
    /// Run a single check and exit
    #[arg(long, conflicts_with = "test_email")]
    once: bool,

    /// Send a test email to verify the SMTP settings and exit
    #[arg(long)]
    test_email: bool,

    /// Path to the configuration file
    #[arg(short, long, env = "POSTAL_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level, including the SMTP exchange
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = MonitorConfig::load(cli.config.as_deref());
    let verbose = cli.verbose
        || config
            .as_ref()
            .is_ok_and(|c| c.testing.verbose_logging);

    // Initialize logging
    let default_filter = if verbose {
        "postal_monitor=debug,lettre=debug"
    } else {
        "postal_monitor=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if cli.verbose {
        config.testing.verbose_logging = true;
    }

    let mode = RunMode::resolve(cli.once, cli.test_email, &config);

    match service::run(config, mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
