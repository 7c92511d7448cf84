use async_trait::async_trait;
use gather_core::{EmailMessage, Mailer, NotifyError};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::app_config::SmtpConfig;

/// SMTP delivery with STARTTLS and a multipart text/HTML body.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = mailbox(&config.from_name, &config.from_email)?;
        let credentials = Credentials::new(config.username.clone(), config.password.expose().clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {}", e)))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self { transport, from })
    }

    fn build(&self, message: &EmailMessage) -> Result<Message, NotifyError> {
        build_message(self.from.clone(), message)
    }
}

fn mailbox(name: &str, address: &str) -> Result<Mailbox, NotifyError> {
    let address = address
        .parse()
        .map_err(|e| NotifyError::InvalidAddress(format!("{}", e)))?;
    let name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
    Ok(Mailbox::new(name, address))
}

fn build_message(from: Mailbox, message: &EmailMessage) -> Result<Message, NotifyError> {
    let to = mailbox(&message.to_name, message.to.expose())?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            message.text_body.clone(),
            message.html_body.clone(),
        ))
        .map_err(|e| NotifyError::Transport(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::Transport(format!("Failed to send email: {}", e)))
    }
}

/// Used when no SMTP settings are configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}
