//! Mail collaborator: fetches request notifications and archives them.

pub mod gmail;
pub mod oauth;

pub use gmail::GmailMailbox;
pub use oauth::{ClientSecret, OAuthClient, StoredToken};

use async_trait::async_trait;

use crate::config::FilterSettings;
use crate::error::MailError;

/// An inbox message announcing a new tutoring request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundNotification {
    /// Provider message id, used for archival.
    pub id: String,
    pub html_body: String,
    pub sender: String,
    pub subject: String,
}

/// Mailbox operations the workflow depends on.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Return every message matching the filter. An empty list is not an error.
    async fn fetch_messages(
        &self,
        filter: &FilterSettings,
    ) -> Result<Vec<InboundNotification>, MailError>;

    /// Mark a message as handled so later runs skip it.
    async fn archive_message(&self, id: &str) -> Result<(), MailError>;
}
