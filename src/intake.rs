//! Email intake: finds request notifications and pulls the request link out
//! of each one.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::FilterSettings;
use crate::error::MailError;
use crate::mail::{InboundNotification, Mailbox};

/// Link text of the anchor that opens the request page.
pub const VIEW_REQUEST_TEXT: &str = "View Request";

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid anchor regex"));

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid href regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Fetch notifications matching the filter. An empty result is a normal
/// outcome; transport and auth failures propagate.
pub async fn fetch_candidate_notifications(
    mailbox: &dyn Mailbox,
    filter: &FilterSettings,
) -> Result<Vec<InboundNotification>, MailError> {
    let notifications = mailbox.fetch_messages(filter).await?;
    info!(count = notifications.len(), "Fetched candidate notifications");
    Ok(notifications)
}

/// The `href` of the anchor whose text is exactly "View Request".
///
/// When several anchors match, the last one wins.
pub fn extract_request_link(notification: &InboundNotification) -> Option<String> {
    let link = find_anchor_href(&notification.html_body, VIEW_REQUEST_TEXT);
    match &link {
        Some(href) => debug!(message_id = %notification.id, href = %href, "Found request link"),
        None => debug!(message_id = %notification.id, "No request link in notification"),
    }
    link
}

/// Last anchor in `html` whose visible text equals `text`.
pub fn find_anchor_href(html: &str, text: &str) -> Option<String> {
    let mut found = None;
    for anchor in ANCHOR_RE.captures_iter(html) {
        let attrs = anchor.get(1).map_or("", |m| m.as_str());
        let inner = anchor.get(2).map_or("", |m| m.as_str());
        if anchor_text(inner) != text {
            continue;
        }
        if let Some(href) = href_attr(attrs) {
            found = Some(href);
        }
    }
    found.filter(|href| !href.is_empty())
}

fn href_attr(attrs: &str) -> Option<String> {
    let caps = HREF_RE.captures(attrs)?;
    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str();
    Some(decode_entities(raw.trim()))
}

/// Visible text of an anchor: tags stripped, entities decoded, whitespace
/// collapsed.
fn anchor_text(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, "");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
