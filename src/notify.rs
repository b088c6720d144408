//! Escalation email to the administrator, sent over SMTP via lettre.

use std::path::Path;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::NotifyError;

/// Subject line of every escalation email.
pub const ESCALATION_SUBJECT: &str = "The Tutors.com Script Needs Your Attention";

/// A message for the administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Escalation {
    /// The paywall notice: the account behind `account` must pay before
    /// further quotes go out.
    pub fn payment_required(admin_email: &str, account: &str) -> Self {
        Self {
            to: admin_email.to_string(),
            subject: ESCALATION_SUBJECT.to_string(),
            body: format!("Payment is needed on one of your accounts related to {account}."),
        }
    }
}

/// Outbound notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Account the notices are sent from, quoted in the message body.
    fn account(&self) -> &str;

    async fn notify(&self, escalation: &Escalation) -> Result<(), NotifyError>;
}

/// SMTP credentials file: `{smtpHost, smtpPort, auth: {email, password}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpCredentials {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub auth: SmtpAuth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpAuth {
    pub email: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_smtp_port() -> u16 {
    587
}

impl SmtpCredentials {
    pub fn from_file(path: &Path) -> Result<Self, NotifyError> {
        let content = std::fs::read_to_string(path).map_err(|e| NotifyError::Credentials {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| NotifyError::Credentials {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// SMTP-backed [`Notifier`]. The sender must be the authenticated account.
pub struct SmtpNotifier {
    credentials: SmtpCredentials,
}

impl SmtpNotifier {
    pub fn new(credentials: SmtpCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn account(&self) -> &str {
        &self.credentials.auth.email
    }

    async fn notify(&self, escalation: &Escalation) -> Result<(), NotifyError> {
        let creds = self.credentials.clone();
        let escalation = escalation.clone();
        let to = escalation.to.clone();

        tokio::task::spawn_blocking(move || send_blocking(&creds, &escalation))
            .await
            .map_err(|e| NotifyError::SendFailed {
                to,
                reason: format!("send task panicked: {e}"),
            })?
    }
}

fn send_blocking(creds: &SmtpCredentials, escalation: &Escalation) -> Result<(), NotifyError> {
    let failed = |reason: String| NotifyError::SendFailed {
        to: escalation.to.clone(),
        reason,
    };

    let email = build_message(&creds.auth.email, escalation)?;

    let transport = SmtpTransport::relay(&creds.smtp_host)
        .map_err(|e| failed(format!("SMTP relay error: {e}")))?
        .port(creds.smtp_port)
        .credentials(Credentials::new(
            creds.auth.email.clone(),
            creds.auth.password.expose_secret().to_string(),
        ))
        .build();

    transport
        .send(&email)
        .map_err(|e| failed(format!("SMTP send failed: {e}")))?;

    tracing::info!(to = %escalation.to, "Escalation email sent");
    Ok(())
}

/// Build the RFC 5322 message for an escalation.
pub fn build_message(from: &str, escalation: &Escalation) -> Result<Message, NotifyError> {
    let failed = |reason: String| NotifyError::SendFailed {
        to: escalation.to.clone(),
        reason,
    };

    Message::builder()
        .from(from.parse().map_err(|e| failed(format!("Invalid from address: {e}")))?)
        .to(escalation
            .to
            .parse()
            .map_err(|e| failed(format!("Invalid to address: {e}")))?)
        .subject(&escalation.subject)
        .body(escalation.body.clone())
        .map_err(|e| failed(format!("Failed to build email: {e}")))
}
