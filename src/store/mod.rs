//! Read-only access to Postal delivery failures
//!
//! The message database is an external collaborator. It is reached through
//! the [`FailureSource`] trait, with [`MySqlFailureSource`] as the production
//! implementation.

pub mod mysql;
pub mod record;

pub use mysql::MySqlFailureSource;
pub use record::{DeliveryStatus, FailureRecord};

use async_trait::async_trait;

/// Only messages with this scope are monitored
pub const OUTGOING_SCOPE: &str = "outgoing";

/// Statuses excluded from the failure query
pub const SUCCESS_STATUSES: [DeliveryStatus; 2] = [DeliveryStatus::Sent, DeliveryStatus::SoftFail];

/// Failures strictly after a delivery id, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureQuery {
    pub after: u64,
}

impl FailureQuery {
    pub fn after(cursor: u64) -> Self {
        Self { after: cursor }
    }

    /// Whether a delivery row belongs in this query's result
    pub fn matches(&self, id: u64, status: &DeliveryStatus, scope: &str) -> bool {
        id > self.after && !status.is_success() && scope == OUTGOING_SCOPE
    }
}

/// Source of delivery failure records
#[async_trait]
pub trait FailureSource: Send + Sync {
    /// Run the failure query, returning records ordered ascending by id
    async fn fetch(&self, query: FailureQuery) -> Result<Vec<FailureRecord>, StoreError>;
}

/// Data store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Invalid row for delivery {id}: {reason}")]
    InvalidRow { id: u64, reason: String },

    #[error("Data store unavailable: {0}")]
    Unavailable(String),
}
