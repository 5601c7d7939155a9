//! Failure poller
//!
//! Queries the data store for failures past the checkpoint, notifies each one
//! in ascending id order and advances the checkpoint after every attempt.
//! The checkpoint advances even when a notification fails, so one poison
//! record cannot stall the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;
use crate::notify::Notifier;
use crate::store::{FailureQuery, FailureRecord, FailureSource, StoreError};

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records returned by the query
    pub found: usize,
    /// Records whose alert was accepted by the transport
    pub notified: usize,
    /// Records whose alert failed
    pub failed: usize,
    /// Cursor after the cycle
    pub checkpoint: u64,
}

/// Polls for failures and drives notifications
pub struct Poller {
    source: Arc<dyn FailureSource>,
    notifier: Notifier,
    checkpoint: Arc<dyn CheckpointStore>,
    cursor: u64,
    send_delay: Duration,
}

impl Poller {
    /// Create a poller resuming from `cursor`, normally the stored checkpoint
    pub fn new(
        source: Arc<dyn FailureSource>,
        notifier: Notifier,
        checkpoint: Arc<dyn CheckpointStore>,
        cursor: u64,
    ) -> Self {
        Self {
            source,
            notifier,
            checkpoint,
            cursor,
            send_delay: Duration::from_secs(1),
        }
    }

    /// Set the pause between successive alerts within a cycle
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Highest delivery id processed so far
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Fetch failures after `cursor`, ascending by id. Does not touch the
    /// checkpoint.
    pub async fn poll_once(&self, cursor: u64) -> Result<Vec<FailureRecord>, StoreError> {
        let mut records = self.source.fetch(FailureQuery::after(cursor)).await?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Run one query-and-notify pass from the current cursor
    pub async fn run_cycle(&mut self) -> Result<CycleReport, PollError> {
        tracing::info!(cursor = self.cursor, "Checking for failed deliveries since ID: {}", self.cursor);

        let records = self.poll_once(self.cursor).await?;
        let mut report = CycleReport {
            found: records.len(),
            checkpoint: self.cursor,
            ..Default::default()
        };

        if records.is_empty() {
            tracing::info!("No new delivery failures found");
            return Ok(report);
        }

        tracing::info!(count = records.len(), "Found {} new delivery failure(s)", records.len());

        for (i, record) in records.iter().enumerate() {
            if i > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            // Failures are logged by the notifier; the cursor moves on regardless
            match self.notifier.send(record).await {
                Ok(()) => report.notified += 1,
                Err(_) => report.failed += 1,
            }

            self.advance(record.id);
        }

        report.checkpoint = self.cursor;
        tracing::info!(
            notified = report.notified,
            failed = report.failed,
            checkpoint = report.checkpoint,
            "Poll cycle complete"
        );
        Ok(report)
    }

    /// Poll every `interval` until `shutdown` is cancelled.
    ///
    /// An in-flight cycle always runs to completion; cancellation is observed
    /// before a cycle starts and while sleeping between cycles.
    pub async fn run_forever(&mut self, interval: Duration, shutdown: CancellationToken) {
        tracing::debug!(interval_secs = interval.as_secs(), "Poll loop started");

        while !shutdown.is_cancelled() {
            if let Err(e) = self.run_cycle().await {
                tracing::error!(
                    error = %e,
                    cursor = self.cursor,
                    "Poll cycle failed; retrying at next interval"
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!(checkpoint = self.cursor, "Monitoring stopped");
    }

    /// Move the cursor to `id` and persist it. The cursor never moves back.
    fn advance(&mut self, id: u64) {
        if id <= self.cursor {
            tracing::warn!(
                delivery_id = id,
                cursor = self.cursor,
                "Ignoring checkpoint regression"
            );
            return;
        }

        self.cursor = id;
        if let Err(e) = self.checkpoint.write(id) {
            tracing::error!(error = %e, checkpoint = id, "Failed to save checkpoint");
        }
    }
}

/// Poll cycle errors
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Failed to query delivery failures: {0}")]
    Store(#[from] StoreError),
}
