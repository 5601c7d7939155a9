//! Delivery failure records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Status of a Postal delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    SoftFail,
    HardFail,
    Held,
    Bounced,
    /// Any status this build does not know about, kept verbatim
    Other(String),
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Sent => "Sent",
            DeliveryStatus::SoftFail => "SoftFail",
            DeliveryStatus::HardFail => "HardFail",
            DeliveryStatus::Held => "Held",
            DeliveryStatus::Bounced => "Bounced",
            DeliveryStatus::Other(s) => s,
        }
    }

    /// Statuses that never produce an alert
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryStatus::Sent | DeliveryStatus::SoftFail)
    }
}

impl FromStr for DeliveryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => DeliveryStatus::Pending,
            "Sent" => DeliveryStatus::Sent,
            "SoftFail" => DeliveryStatus::SoftFail,
            "HardFail" => DeliveryStatus::HardFail,
            "Held" => DeliveryStatus::Held,
            "Bounced" => DeliveryStatus::Bounced,
            other => DeliveryStatus::Other(other.to_string()),
        })
    }
}

impl From<String> for DeliveryStatus {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed outgoing delivery, as read from the message database.
///
/// Records are immutable once read and are dropped after their notification
/// attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    /// Delivery id; monotonic, used as ordering key and checkpoint value
    pub id: u64,
    pub message_id: u64,
    pub status: DeliveryStatus,
    pub code: Option<String>,
    pub output: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub mail_from: String,
    pub rcpt_to: String,
    pub subject: Option<String>,
    pub scope: String,
}
