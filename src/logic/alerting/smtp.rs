//! SMTP Mail Transport
//!
//! `MailTransport` over lettre's async SMTP client. Port 465 uses implicit TLS,
//! 587 requires STARTTLS, any other port upgrades opportunistically.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::senders::{MailMessage, MailTransport, SmtpTarget};
use super::types::AlertError;

const SMTPS_PORT: u16 = 465;
const SUBMISSION_PORT: u16 = 587;

pub struct SmtpMailTransport {
    timeout: Duration,
}

impl SmtpMailTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn transport(&self, target: &SmtpTarget) -> Result<AsyncSmtpTransport<Tokio1Executor>, AlertError> {
        let params = TlsParameters::new(target.host.clone()).map_err(mail_error)?;
        let tls = match target.port {
            SMTPS_PORT => Tls::Wrapper(params),
            SUBMISSION_PORT => Tls::Required(params),
            _ => Tls::Opportunistic(params),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(target.host.as_str())
            .port(target.port)
            .tls(tls)
            .timeout(Some(self.timeout));
        if let Some(ref username) = target.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                target.password.clone().unwrap_or_default(),
            ));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send_mail(&self, target: &SmtpTarget, message: &MailMessage) -> Result<(), AlertError> {
        let email = build_message(message)?;
        let transport = self.transport(target)?;
        transport.send(email).await.map_err(mail_error)?;
        log::debug!("Mail sent via {}:{} to {}", target.host, target.port, message.to.join(", "));
        Ok(())
    }
}

/// HTML message with every recipient on `To`
pub fn build_message(message: &MailMessage) -> Result<Message, AlertError> {
    let from: Mailbox = message.from.parse().map_err(mail_error)?;
    let mut builder = Message::builder().from(from).subject(message.subject.as_str());
    for recipient in &message.to {
        let to: Mailbox = recipient.parse().map_err(mail_error)?;
        builder = builder.to(to);
    }
    builder
        .header(ContentType::TEXT_HTML)
        .body(message.html_body.clone())
        .map_err(mail_error)
}

fn mail_error(e: impl std::fmt::Display) -> AlertError {
    AlertError::Mail(e.to_string())
}
