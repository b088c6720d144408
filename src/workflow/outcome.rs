//! Per-item and per-run outcomes.

use std::fmt;

use reqwest::Url;
use uuid::Uuid;

use crate::config::SiteSettings;

/// Where a single quote submission landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Back on the requests queue.
    Success,
    /// The paywall page. Stops the run.
    PaymentRequired,
    /// Anywhere else.
    UnexpectedState(String),
}

/// Classify the location reached after submitting a quote.
///
/// Pages match on scheme, host and path; a trailing slash, query string or
/// fragment does not change the classification.
pub fn classify_url(url: &str, site: &SiteSettings) -> ItemOutcome {
    if same_page(url, &site.requests_url) {
        ItemOutcome::Success
    } else if same_page(url, &site.payment_url) {
        ItemOutcome::PaymentRequired
    } else {
        ItemOutcome::UnexpectedState(url.to_string())
    }
}

/// True when `a` and `b` name the same page.
pub fn same_page(a: &str, b: &str) -> bool {
    page_key(a) == page_key(b)
}

/// Identity of the page behind `url`: scheme, host, port and path with any
/// trailing slash removed. Query and fragment are dropped. Text that does not
/// parse as a URL is keyed on itself.
pub fn page_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let port = parsed
                .port_or_known_default()
                .map(|p| format!(":{p}"))
                .unwrap_or_default();
            format!(
                "{}://{}{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default(),
                port,
                parsed.path().trim_end_matches('/')
            )
        }
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

/// Result of one full pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AllHandled,
    PaymentRequired,
    UnexpectedState,
    NoEmails,
}

impl RunOutcome {
    /// Process exit code in one-shot mode.
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::AllHandled | RunOutcome::NoEmails => 0,
            RunOutcome::PaymentRequired => 2,
            RunOutcome::UnexpectedState => 3,
        }
    }

    /// The line logged at the end of every run.
    pub fn status_message(self) -> &'static str {
        match self {
            RunOutcome::NoEmails => "No emails were found, the current process has ended.",
            RunOutcome::AllHandled => {
                "All emails have been successfully handled and messages replied to!"
            }
            RunOutcome::PaymentRequired => "Payment is necessary. The admin has been notified.",
            RunOutcome::UnexpectedState => {
                "There was an issue with the process. The browser ended on an unexpected page."
            }
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunOutcome::AllHandled => "all_handled",
            RunOutcome::PaymentRequired => "payment_required",
            RunOutcome::UnexpectedState => "unexpected_state",
            RunOutcome::NoEmails => "no_emails",
        };
        f.write_str(name)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Ids of notifications archived this run, in order.
    pub archived: Vec<String>,
    /// Ids of notifications with no request link.
    pub skipped: Vec<String>,
    pub quotes_sent: usize,
    /// Whether the administrator was emailed successfully.
    pub escalated: bool,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            outcome: RunOutcome::NoEmails,
            archived: Vec::new(),
            skipped: Vec::new(),
            quotes_sent: 0,
            escalated: false,
        }
    }

    /// The closing log line. A paywall whose alert could not be sent says so.
    pub fn status_message(&self) -> &'static str {
        match self.outcome {
            RunOutcome::PaymentRequired if !self.escalated => {
                "Payment is necessary, but the admin could not be notified."
            }
            outcome => outcome.status_message(),
        }
    }
}
