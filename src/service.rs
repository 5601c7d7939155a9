//! Service wiring
//!
//! Builds the store, checkpoint, transport and poller from a loaded
//! configuration and runs them in the requested mode.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointError, CheckpointStore, FileCheckpoint};
use crate::config::{ConfigError, MonitorConfig};
use crate::notify::{Notifier, NotifyError, SmtpMailer, TraceSink, TracingSink, TransportError};
use crate::poller::{PollError, Poller};
use crate::store::{FailureSource, MySqlFailureSource, StoreError};

/// What the process should do after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One poll cycle, then exit
    Once,
    /// Poll until interrupted
    Continuous,
    /// Send the test email and exit
    TestEmail,
}

impl RunMode {
    /// Pick the mode from the command-line flags. The `testing.test_mode`
    /// setting forces [`RunMode::TestEmail`].
    pub fn resolve(once: bool, test_email: bool, config: &MonitorConfig) -> Self {
        if test_email || config.testing.test_mode {
            RunMode::TestEmail
        } else if once {
            RunMode::Once
        } else {
            RunMode::Continuous
        }
    }
}

/// Run the monitor in `mode` until it finishes or is interrupted
pub async fn run(config: MonitorConfig, mode: RunMode) -> Result<(), ServiceError> {
    tracing::info!(?mode, "Postal monitor starting");

    let notifier = build_notifier(&config)?;

    if mode == RunMode::TestEmail {
        notifier.send_test().await?;
        return Ok(());
    }

    let source = MySqlFailureSource::connect(&config.database).await?;
    let mut poller = build_poller(&config, Arc::new(source.clone()), notifier)?;

    let result = match mode {
        RunMode::Once => poller.run_cycle().await.map(|_| ()).map_err(ServiceError::from),
        _ => {
            let shutdown = CancellationToken::new();
            tokio::spawn(cancel_on_signal(shutdown.clone()));

            tracing::info!(
                "Starting continuous monitoring (check every {} minutes)",
                config.monitoring.check_interval_minutes
            );
            poller
                .run_forever(config.monitoring.check_interval(), shutdown)
                .await;
            Ok(())
        }
    };

    source.close().await;
    result
}

/// Build the notifier over an SMTP transport. Verbose logging attaches a
/// protocol trace.
pub fn build_notifier(config: &MonitorConfig) -> Result<Notifier, ServiceError> {
    let trace: Option<Arc<dyn TraceSink>> = if config.testing.verbose_logging {
        Some(Arc::new(TracingSink))
    } else {
        None
    };

    let mailer = SmtpMailer::new(&config.smtp, trace)?;
    Ok(Notifier::new(Arc::new(mailer), &config.notifications)?)
}

/// Build a poller resuming from the checkpoint file. A corrupt checkpoint is
/// an error rather than a silent restart from zero.
pub fn build_poller(
    config: &MonitorConfig,
    source: Arc<dyn FailureSource>,
    notifier: Notifier,
) -> Result<Poller, ServiceError> {
    let checkpoint = FileCheckpoint::new(&config.monitoring.state_file_path);
    let cursor = checkpoint.read()?;
    tracing::info!(
        path = %checkpoint.path().display(),
        checkpoint = cursor,
        "Loaded checkpoint"
    );

    Ok(Poller::new(source, notifier, Arc::new(checkpoint), cursor)
        .with_send_delay(config.monitoring.send_delay()))
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    wait_for_signal().await;
    tracing::info!("Shutdown signal received, stopping after the current cycle");
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Errors that end the process
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Failed to configure SMTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Poll(#[from] PollError),
}
