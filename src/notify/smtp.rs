//! SMTP transport built on lettre

use std::sync::Arc;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::response::Response;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::Level;

use super::transport::{
    MailTransport, TraceSink, TransportError, TransportReply, TransportSettings,
};
use super::wire;
use crate::config::{SmtpConfig, TlsMode};

/// Mail transport speaking SMTP to the configured relay.
///
/// Each delivery opens its own connection. When a [`TraceSink`] is attached
/// the lines lettre writes to and reads from the server during a delivery are
/// forwarded to it in order, followed by the final reply or the error.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    settings: TransportSettings,
    trace: Option<Arc<dyn TraceSink>>,
}

impl SmtpMailer {
    pub fn new(
        config: &SmtpConfig,
        trace: Option<Arc<dyn TraceSink>>,
    ) -> Result<Self, TransportError> {
        let tls_parameters = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(config.allow_insecure_tls)
            .dangerous_accept_invalid_hostnames(config.allow_insecure_tls)
            .build()
            .map_err(TransportError::Tls)?;

        let tls = match config.tls_mode() {
            TlsMode::StartTls => Tls::Required(tls_parameters),
            TlsMode::Implicit => Tls::Wrapper(tls_parameters),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls)
            .timeout(Some(config.timeout()));

        if config.has_credentials() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ));
        }

        if config.allow_insecure_tls {
            tracing::warn!(
                host = %config.host,
                "SMTP certificate verification is disabled; connections are open to interception"
            );
        }

        Ok(Self {
            transport: builder.build(),
            settings: TransportSettings {
                host: config.host.clone(),
                port: config.port,
                tls: config.tls_mode(),
                authenticated: config.has_credentials(),
                insecure: config.allow_insecure_tls,
            },
            trace,
        })
    }
}

fn reply_from(response: &Response) -> TransportReply {
    TransportReply::new(
        response.code().to_string(),
        response.message().map(|line| line.to_string()).collect(),
    )
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: Message) -> Result<TransportReply, TransportError> {
        let Some(sink) = &self.trace else {
            return self
                .transport
                .send(message)
                .await
                .map(|response| reply_from(&response))
                .map_err(TransportError::Smtp);
        };

        sink.emit(Level::DEBUG, &format!("Connecting to {}", self.settings));
        let (result, exchange) = wire::capture(self.transport.send(message)).await;
        for (level, line) in &exchange {
            sink.emit(*level, line);
        }

        match result {
            Ok(response) => {
                let reply = reply_from(&response);
                for line in &reply.lines {
                    sink.emit(Level::INFO, &format!("{} {}", reply.code, line));
                }
                Ok(reply)
            }
            Err(e) => {
                sink.emit(Level::ERROR, &format!("SMTP failure: {}", e));
                Err(TransportError::Smtp(e))
            }
        }
    }

    fn settings(&self) -> TransportSettings {
        self.settings.clone()
    }
}
