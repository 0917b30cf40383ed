//! Email delivery through an SMTP relay.
//!
//! Every email opens its own connection. STARTTLS is used when the relay offers it
//! and `SMTP_STARTTLS` allows it. The transaction as a whole is bounded by
//! [`SmtpConfig::timeout`].

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use super::NotificationChannel;
use crate::config::SmtpConfig;
use crate::domain::EmailNotification;
use crate::error::{Error, Result};

const PROVIDER: &str = "smtp";

fn smtp_error(message: impl Into<String>) -> Error {
    Error::provider(PROVIDER, message)
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::validation(format!("Invalid email address '{address}': {e}")))
}

/// Build the plain-text message for `email`.
pub fn build_message(from: &str, email: &EmailNotification) -> Result<Message> {
    Message::builder()
        .from(mailbox(from)?)
        .to(mailbox(&email.email)?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.message.clone())
        .map_err(|e| smtp_error(format!("failed to build message: {e}")))
}

/// Email channel backed by a single SMTP relay.
pub struct SmtpClient {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpClient {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let tls = if config.starttls {
            crate::http_client::install_rustls_provider();
            let parameters = TlsParameters::new(config.host.clone())
                .map_err(|e| Error::config(format!("SMTP TLS setup failed: {e}")))?;
            Tls::Opportunistic(parameters)
        } else {
            Tls::None
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .hello_name(ClientId::Domain(config.helo.clone()))
            .timeout(Some(config.timeout))
            .tls(tls);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder
                .credentials(Credentials::new(username.clone(), password.clone()))
                .authentication(vec![Mechanism::Plain, Mechanism::Login]);
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub async fn send_mail(&self, email: &EmailNotification) -> Result<()> {
        let message = build_message(&self.config.from, email)?;
        let timeout = self.config.timeout;

        let response = tokio::time::timeout(timeout, self.transport.send(message))
            .await
            .map_err(|_| smtp_error(format!("transaction timed out after {timeout:?}")))?
            .map_err(|e| smtp_error(e.to_string()))?;

        debug!(code = %response.code(), "SMTP relay reply");
        info!(recipient = %email.email, "Email accepted by SMTP relay");
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel<EmailNotification> for SmtpClient {
    fn channel_type(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, message: &EmailNotification) -> Result<()> {
        self.send_mail(message).await
    }
}
