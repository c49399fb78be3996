//! Outbound notification delivery for confirmation and recovery codes.
//!
//! The orchestrator only depends on the `NotificationGateway` contract. The
//! default for local development is `LogMailer`, which logs and returns
//! `Ok(())`; `MemoryMailer` records messages for tests; `SmtpMailer` delivers
//! real email over SMTP with links built from a configured base URL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::info;

/// "Send confirmation/recovery email" capability consumed by the auth core.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_confirmation_email(&self, email: &str, code: &str) -> Result<()>;

    async fn send_password_recovery_email(&self, email: &str, code: &str) -> Result<()>;
}

/// Local dev gateway that logs instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl NotificationGateway for LogMailer {
    async fn send_confirmation_email(&self, email: &str, code: &str) -> Result<()> {
        info!(to_email = %email, code = %code, "confirmation email send stub");
        Ok(())
    }

    async fn send_password_recovery_email(&self, email: &str, code: &str) -> Result<()> {
        info!(to_email = %email, code = %code, "recovery email send stub");
        Ok(())
    }
}

/// A captured outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to_email: String,
    pub code: String,
    pub kind: EmailKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Confirmation,
    Recovery,
}

/// Recording gateway for tests and embedded setups.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    async fn record(&self, email: &str, code: &str, kind: EmailKind) {
        self.sent.lock().await.push(SentEmail {
            to_email: email.to_string(),
            code: code.to_string(),
            kind,
        });
    }
}

#[async_trait]
impl NotificationGateway for MemoryMailer {
    async fn send_confirmation_email(&self, email: &str, code: &str) -> Result<()> {
        self.record(email, code, EmailKind::Confirmation).await;
        Ok(())
    }

    async fn send_password_recovery_email(&self, email: &str, code: &str) -> Result<()> {
        self.record(email, code, EmailKind::Recovery).await;
        Ok(())
    }
}

/// SMTP connection settings plus the frontend base URL for links.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
    pub base_url: String,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST is not set")?;
        let port = std::env::var("SMTP_PORT")
            .context("SMTP_PORT is not set")?
            .parse::<u16>()
            .context("SMTP_PORT must be a port number")?;
        let username = std::env::var("SMTP_USER").context("SMTP_USER is not set")?;
        let password =
            SecretString::from(std::env::var("SMTP_PASSWORD").context("SMTP_PASSWORD is not set")?);
        let base_url =
            std::env::var("CONFIRMATION_BASE_URL").context("CONFIRMATION_BASE_URL is not set")?;
        Ok(Self {
            host,
            port,
            from: username.clone(),
            username,
            password,
            base_url,
        })
    }
}

/// Real SMTP delivery via lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .context("failed to build smtp transport")?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .build();
        let from = config
            .from
            .parse()
            .context("SMTP sender address is invalid")?;
        Ok(Self {
            transport,
            from,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send(&self, email: &str, subject: &str, html: String) -> Result<()> {
        let to = email.parse().context("recipient address is invalid")?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .context("failed to build email message")?;
        self.transport
            .send(message)
            .await
            .context("failed to send email")?;
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for SmtpMailer {
    async fn send_confirmation_email(&self, email: &str, code: &str) -> Result<()> {
        let link = confirmation_url(&self.base_url, code);
        let html = format!(
            "<h1>Thanks for registering</h1>\
             <p>To finish registration, follow the link below:</p>\
             <p><a href=\"{link}\">complete registration</a></p>"
        );
        self.send(email, "Confirm your email", html).await
    }

    async fn send_password_recovery_email(&self, email: &str, code: &str) -> Result<()> {
        let link = recovery_url(&self.base_url, code);
        let html = format!(
            "<h1>Password recovery</h1>\
             <p>To set a new password, follow the link below:</p>\
             <p><a href=\"{link}\">set new password</a></p>"
        );
        self.send(email, "Password recovery", html).await
    }
}

fn confirmation_url(base_url: &str, code: &str) -> String {
    format!("{base_url}/confirm-email?code={code}")
}

fn recovery_url(base_url: &str, code: &str) -> String {
    format!("{base_url}/new-password?recoveryCode={code}")
}
