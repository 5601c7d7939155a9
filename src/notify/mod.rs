//! Failure notifications
//!
//! Renders an alert for each delivery failure and hands it to a
//! [`MailTransport`]. A send walks `Building -> Dispatching` and ends in
//! either `Sent` or `Failed`; there is no retry within a send.

pub mod render;
pub mod smtp;
pub mod transport;
pub mod wire;

pub use render::{render_alert, test_message, AlertMessage, PLACEHOLDER};
pub use smtp::SmtpMailer;
pub use transport::{
    MailTransport, TraceSink, TracingSink, TransportError, TransportReply, TransportSettings,
};

use std::sync::Arc;

use lettre::message::{Mailbox, MultiPart};
use lettre::{Address, Message};

use crate::config::NotificationConfig;
use crate::store::FailureRecord;

/// Sends failure alerts to the configured recipient
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    from: Mailbox,
    to: Mailbox,
}

impl Notifier {
    /// Create a notifier, validating the sender and recipient addresses
    pub fn new(
        transport: Arc<dyn MailTransport>,
        config: &NotificationConfig,
    ) -> Result<Self, NotifyError> {
        let from_address: Address = config
            .from_email
            .trim()
            .parse()
            .map_err(|source| NotifyError::Address {
                field: "notifications.from_email",
                value: config.from_email.clone(),
                source,
            })?;
        let to_address: Address = config
            .email
            .trim()
            .parse()
            .map_err(|source| NotifyError::Address {
                field: "notifications.email",
                value: config.email.clone(),
                source,
            })?;

        let from_name = Some(config.from_name.clone()).filter(|n| !n.trim().is_empty());

        Ok(Self {
            transport,
            from: Mailbox::new(from_name, from_address),
            to: Mailbox::new(None, to_address),
        })
    }

    pub fn from_mailbox(&self) -> &Mailbox {
        &self.from
    }

    pub fn to_mailbox(&self) -> &Mailbox {
        &self.to
    }

    /// Send the alert for one failure record.
    ///
    /// Errors are logged here with the delivery id; the caller only decides
    /// what to do next.
    pub async fn send(&self, record: &FailureRecord) -> Result<(), NotifyError> {
        let alert = render_alert(record);

        match self.dispatch(alert).await {
            Ok(reply) => {
                tracing::info!(
                    delivery_id = record.id,
                    status = %record.status,
                    reply = reply.first_line().unwrap_or_default(),
                    "Notification sent for delivery ID: {}",
                    record.id
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    delivery_id = record.id,
                    status = %record.status,
                    error = %e,
                    "Failed to send notification for delivery ID: {}",
                    record.id
                );
                Err(e)
            }
        }
    }

    /// Send the static test message over the same transport path
    pub async fn send_test(&self) -> Result<(), NotifyError> {
        let settings = self.transport.settings();
        tracing::info!(
            host = %settings.host,
            port = settings.port,
            from = %self.from,
            to = %self.to,
            tls = %settings.tls,
            authenticated = settings.authenticated,
            verify_certificates = !settings.insecure,
            "Sending test email"
        );

        match self.dispatch(test_message(chrono::Utc::now())).await {
            Ok(reply) => {
                tracing::info!(
                    to = %self.to,
                    reply = reply.first_line().unwrap_or_default(),
                    "Test email sent successfully"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send test email");
                Err(e)
            }
        }
    }

    async fn dispatch(&self, alert: AlertMessage) -> Result<TransportReply, NotifyError> {
        let message = self.build(alert)?;
        Ok(self.transport.deliver(message).await?)
    }

    fn build(&self, alert: AlertMessage) -> Result<Message, NotifyError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(alert.subject)
            .multipart(MultiPart::alternative_plain_html(alert.text, alert.html))?)
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid address for {field} ({value:?}): {source}")]
    Address {
        field: &'static str,
        value: String,
        source: lettre::address::AddressError,
    },

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
