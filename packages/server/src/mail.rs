use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use crate::config::MailConfig;

pub const NEW_DEVICE_SUBJECT: &str = "Security notice: new sign-in";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Outbound mail delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Delivers through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let mut builder = builder.port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse()?)
            .subject(mail.subject)
            .multipart(MultiPart::alternative_plain_html(
                mail.text_body,
                mail.html_body,
            ))?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Writes mails to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            "Mail delivery disabled, logging instead:\n{}",
            mail.text_body
        );
        Ok(())
    }
}

pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    if config.enabled {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Security notice for a sign-in from a device the account has not used before.
pub fn new_device_mail(to: &str, at: DateTime<Utc>, ip: &str, user_agent: &str) -> OutgoingMail {
    let when = at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let agent = if user_agent.is_empty() {
        "unknown"
    } else {
        user_agent
    };

    let text_body = format!(
        "We noticed a sign-in to your account from a new device.\n\n\
         Time: {when}\n\
         IP address: {ip}\n\
         Device: {agent}\n\n\
         If this was you, no action is needed. If not, change your password right away.\n"
    );
    let html_body = format!(
        "<p>We noticed a sign-in to your account from a new device.</p>\
         <ul><li>Time: {}</li><li>IP address: {}</li><li>Device: {}</li></ul>\
         <p>If this was you, no action is needed. If not, change your password right away.</p>",
        escape_html(&when),
        escape_html(ip),
        escape_html(agent),
    );

    OutgoingMail {
        to: to.to_string(),
        subject: NEW_DEVICE_SUBJECT.to_string(),
        text_body,
        html_body,
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
