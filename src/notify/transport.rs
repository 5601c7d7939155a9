//! Mail transport seam and protocol tracing

use std::fmt;

use async_trait::async_trait;
use lettre::Message;
use tracing::Level;

use crate::config::TlsMode;

/// Target used for forwarded SMTP protocol lines
pub const SMTP_TRACE_TARGET: &str = "postal_monitor::smtp";

/// Send-message capability
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Hand a fully built message to the transport
    async fn deliver(&self, message: Message) -> Result<TransportReply, TransportError>;

    /// Resolved endpoint settings, for diagnostics
    fn settings(&self) -> TransportSettings;
}

/// Receives protocol trace lines tagged with a severity
pub trait TraceSink: Send + Sync {
    fn emit(&self, level: Level, message: &str);
}

/// Forwards trace lines to `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!(target: SMTP_TRACE_TARGET, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(target: SMTP_TRACE_TARGET, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(target: SMTP_TRACE_TARGET, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(target: SMTP_TRACE_TARGET, "{}", message);
        } else {
            tracing::trace!(target: SMTP_TRACE_TARGET, "{}", message);
        }
    }
}

/// Final server reply for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub code: String,
    pub lines: Vec<String>,
}

impl TransportReply {
    pub fn new(code: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            code: code.into(),
            lines,
        }
    }

    /// First reply line, e.g. `2.0.0 Ok: queued as 4F2A1`
    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }
}

/// Endpoint settings of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub authenticated: bool,
    /// Certificate and hostname verification disabled
    pub insecure: bool,
}

impl fmt::Display for TransportSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({}", self.host, self.port, self.tls)?;
        if self.insecure {
            write!(f, ", certificate checks disabled")?;
        }
        write!(f, ")")
    }
}

/// Transport errors, carrying the transport's diagnostic text
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("TLS setup failed: {0}")]
    Tls(#[source] lettre::transport::smtp::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[source] lettre::transport::smtp::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
