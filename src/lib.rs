//! Postal Monitor: delivery failure alerts for a Postal mail server
//!
//! Polls a Postal server's message database for outgoing deliveries that did
//! not succeed and emails an alert for each one. Progress is tracked by a
//! checkpoint file holding the highest delivery id already handled, so a
//! restart neither repeats nor skips alerts.
//!
//! # Components
//!
//! - **store**: read-only access to the deliveries and messages tables
//! - **notify**: alert rendering and SMTP delivery
//! - **checkpoint**: durable resume point
//! - **poller**: the query, notify and advance cycle
//! - **service**: wiring and run modes for the binary
//!
//! # Example
//!
//! ```no_run
//! use postal_monitor::config::MonitorConfig;
//! use postal_monitor::service::{run, RunMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::load(None)?;
//! run(config, RunMode::Once).await?;
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod notify;
pub mod poller;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use checkpoint::{CheckpointError, CheckpointStore, FileCheckpoint};
pub use config::{ConfigError, MonitorConfig};
pub use notify::{MailTransport, Notifier, NotifyError, SmtpMailer};
pub use poller::{CycleReport, PollError, Poller};
pub use service::{RunMode, ServiceError};
pub use store::{DeliveryStatus, FailureRecord, FailureSource, MySqlFailureSource, StoreError};
