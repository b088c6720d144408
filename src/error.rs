//! Error types for the autoresponder.

use std::time::Duration;

/// Top-level error type for a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

impl Error {
    /// True when the mailbox rejected our credentials or token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Mail(MailError::AuthFailed { .. }))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail collaborator errors (Gmail API + OAuth).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mailbox authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Mailbox request timed out: {operation}")]
    Timeout { operation: String },

    #[error("Mailbox request {operation} failed: {reason}")]
    Request { operation: String, reason: String },

    #[error("Invalid response from mailbox for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Browser-automation errors.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to start browser session: {reason}")]
    SessionFailed { reason: String },

    #[error("Browser command {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Element {selector} not found")]
    ElementNotFound { selector: String },

    #[error("Browser command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Page script returned unexpected data: {reason}")]
    Script { reason: String },
}

/// Escalation email errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to load SMTP credentials from {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("Failed to send notification to {to}: {reason}")]
    SendFailed { to: String, reason: String },
}

/// Result type alias for the autoresponder.
pub type Result<T> = std::result::Result<T, Error>;
