//! Gmail REST mailbox: lists matching messages, fetches them raw, and
//! archives handled ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mail_parser::MessageParser;
use serde::Deserialize;
use tracing::{debug, warn};

use super::oauth::{OAuthClient, request_error};
use super::{InboundNotification, Mailbox};
use crate::config::FilterSettings;
use crate::error::MailError;

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Per-request timeout for Gmail calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    raw: String,
}

/// Gmail-backed [`Mailbox`].
pub struct GmailMailbox {
    oauth: Arc<OAuthClient>,
    http: reqwest::Client,
    api_base: String,
}

impl GmailMailbox {
    pub fn new(oauth: Arc<OAuthClient>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            oauth,
            http,
            api_base: GMAIL_API.to_string(),
        }
    }

    /// Point the mailbox at another API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Send a request built around the current access token. A 401 means the
    /// token was revoked before its expiry, so it is invalidated and the
    /// request is sent once more with a refreshed one.
    async fn send_authorized<F>(
        &self,
        operation: &str,
        build: F,
    ) -> Result<reqwest::Response, MailError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.oauth.access_token().await?;
        let resp = build(&token)
            .send()
            .await
            .map_err(|e| request_error(operation, e))?;
        if resp.status() != reqwest::StatusCode::UNAUTHORIZED {
            return check_status(resp, operation).await;
        }

        warn!(operation, "Access token rejected, refreshing");
        self.oauth.invalidate().await?;
        let token = self.oauth.access_token().await?;
        let resp = build(&token)
            .send()
            .await
            .map_err(|e| request_error(operation, e))?;
        check_status(resp, operation).await
    }

    async fn list_ids(&self, query: &str) -> Result<Vec<String>, MailError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = format!("{}/messages", self.api_base);
            let list: ListResponse = self
                .send_authorized("list messages", |token| {
                    let req = self
                        .http
                        .get(&url)
                        .bearer_auth(token)
                        .query(&[("q", query)]);
                    match &page_token {
                        Some(page) => req.query(&[("pageToken", page.as_str())]),
                        None => req,
                    }
                })
                .await?
                .json()
                .await
                .map_err(|e| invalid_response("list messages", e))?;

            ids.extend(list.messages.into_iter().map(|m| m.id));
            match list.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }

    async fn fetch_one(&self, id: &str) -> Result<Option<InboundNotification>, MailError> {
        let url = format!("{}/messages/{id}", self.api_base);
        let raw: RawMessage = self
            .send_authorized("get message", |token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("format", "raw")])
            })
            .await?
            .json()
            .await
            .map_err(|e| invalid_response("get message", e))?;

        let bytes = decode_raw(&raw.raw)?;
        Ok(parse_notification(&raw.id, &bytes))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn fetch_messages(
        &self,
        filter: &FilterSettings,
    ) -> Result<Vec<InboundNotification>, MailError> {
        let query = build_query(filter);
        debug!(query = %query, "Searching mailbox");

        let ids = self.list_ids(&query).await?;
        let mut notifications = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.fetch_one(id).await? {
                Some(notification) => notifications.push(notification),
                None => warn!(message_id = %id, "Skipping message with no body"),
            }
        }
        Ok(notifications)
    }

    async fn archive_message(&self, id: &str) -> Result<(), MailError> {
        let url = format!("{}/messages/{id}/modify", self.api_base);
        let body = serde_json::json!({ "removeLabelIds": ["INBOX", "UNREAD"] });
        self.send_authorized("archive message", |token| {
            self.http.post(&url).bearer_auth(token).json(&body)
        })
        .await?;
        Ok(())
    }
}

/// Gmail search query for a filter.
pub fn build_query(filter: &FilterSettings) -> String {
    let mut parts = Vec::new();
    if !filter.from.trim().is_empty() {
        parts.push(format!("from:{}", filter.from.trim()));
    }
    if !filter.to.trim().is_empty() {
        parts.push(format!("to:{}", filter.to.trim()));
    }
    if !filter.subject.trim().is_empty() {
        parts.push(format!("subject:\"{}\"", filter.subject.trim().replace('"', "")));
    }
    if filter.unread_only {
        parts.push("is:unread".into());
    }
    parts.push("in:inbox".into());
    parts.join(" ")
}

/// Decode Gmail's base64url `raw` field, with or without padding.
pub fn decode_raw(raw: &str) -> Result<Vec<u8>, MailError> {
    URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .map_err(|e| MailError::InvalidResponse {
            operation: "decode message".into(),
            reason: e.to_string(),
        })
}

/// Build a notification from an RFC 822 message. `None` if it has no body.
pub fn parse_notification(id: &str, bytes: &[u8]) -> Option<InboundNotification> {
    let parsed = MessageParser::default().parse(bytes)?;
    let html_body = parsed.body_html(0)?.into_owned();
    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());
    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    Some(InboundNotification {
        id: id.to_string(),
        html_body,
        sender,
        subject,
    })
}

async fn check_status(
    resp: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, MailError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(MailError::AuthFailed {
            reason: format!("{operation} returned {status}: {body}"),
        });
    }
    Err(MailError::Request {
        operation: operation.into(),
        reason: format!("{status}: {body}"),
    })
}

fn invalid_response(operation: &str, e: reqwest::Error) -> MailError {
    MailError::InvalidResponse {
        operation: operation.into(),
        reason: e.to_string(),
    }
}
