//! One autoresponder pass over the inbox.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::chain::RequestChain;
use super::outcome::{ItemOutcome, RunOutcome, RunReport};
use crate::browser::{BrowserLauncher, BrowserSession};
use crate::config::Settings;
use crate::error::Result;
use crate::intake::{extract_request_link, fetch_candidate_notifications};
use crate::mail::{InboundNotification, Mailbox};
use crate::notify::{Escalation, Notifier};

/// Runs passes against the configured collaborators. Cheap to share behind
/// an `Arc`; overlapping passes are prevented by the scheduler, not here.
pub struct RunEngine {
    settings: Arc<Settings>,
    mailbox: Arc<dyn Mailbox>,
    launcher: Arc<dyn BrowserLauncher>,
    notifier: Arc<dyn Notifier>,
}

impl RunEngine {
    pub fn new(
        settings: Arc<Settings>,
        mailbox: Arc<dyn Mailbox>,
        launcher: Arc<dyn BrowserLauncher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            mailbox,
            launcher,
            notifier,
        }
    }

    /// Run one pass: fetch notifications, work each request chain, archive
    /// or escalate, and close the browser.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);

        async move {
            let started = Instant::now();
            let result = self.run_pass(run_id).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(report) => info!(
                    outcome = %report.outcome,
                    archived = report.archived.len(),
                    skipped = report.skipped.len(),
                    quotes_sent = report.quotes_sent,
                    elapsed_ms,
                    "{}",
                    report.status_message()
                ),
                Err(e) => error!(elapsed_ms, "There was an issue with the process: {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_pass(&self, run_id: Uuid) -> Result<RunReport> {
        let mut report = RunReport::new(run_id);

        let notifications =
            fetch_candidate_notifications(self.mailbox.as_ref(), &self.settings.filter).await?;
        if notifications.is_empty() {
            report.outcome = RunOutcome::NoEmails;
            return Ok(report);
        }

        let mut work = Vec::with_capacity(notifications.len());
        for notification in &notifications {
            match extract_request_link(notification) {
                Some(link) => work.push((notification, link)),
                None => {
                    warn!(
                        message_id = %notification.id,
                        subject = %notification.subject,
                        "No request link in notification, leaving it unread"
                    );
                    report.skipped.push(notification.id.clone());
                }
            }
        }
        if work.is_empty() {
            report.outcome = RunOutcome::AllHandled;
            return Ok(report);
        }

        let session = self.launcher.launch().await?;
        let result = self.process(session.as_ref(), &work, &mut report).await;
        if let Err(e) = session.end().await {
            warn!("Failed to close browser session: {e}");
        }
        report.outcome = result?;

        if report.outcome == RunOutcome::PaymentRequired {
            report.escalated = self.escalate().await;
        }
        Ok(report)
    }

    /// Work request links in order, stopping at the first chain that does
    /// not end on the requests queue.
    async fn process(
        &self,
        session: &dyn BrowserSession,
        work: &[(&InboundNotification, String)],
        report: &mut RunReport,
    ) -> Result<RunOutcome> {
        for (notification, link) in work {
            let chain = RequestChain::new(session, &self.settings)
                .run(link)
                .await?;
            report.quotes_sent += chain.quotes_sent;

            match chain.outcome {
                ItemOutcome::Success => {
                    self.mailbox.archive_message(&notification.id).await?;
                    report.archived.push(notification.id.clone());
                    info!(message_id = %notification.id, "Notification handled and archived");
                }
                ItemOutcome::PaymentRequired => {
                    warn!(message_id = %notification.id, "Reached the payment page, stopping");
                    return Ok(RunOutcome::PaymentRequired);
                }
                ItemOutcome::UnexpectedState(url) => {
                    error!(message_id = %notification.id, url = %url, "Quote landed on an unexpected page, stopping");
                    return Ok(RunOutcome::UnexpectedState);
                }
            }
        }
        Ok(RunOutcome::AllHandled)
    }

    /// Email the administrator about the paywall. A failed send is logged and
    /// does not change the run outcome.
    async fn escalate(&self) -> bool {
        let notice = Escalation::payment_required(&self.settings.admin_email, self.notifier.account());
        match self.notifier.notify(&notice).await {
            Ok(()) => true,
            Err(e) => {
                error!(to = %notice.to, "Failed to notify admin: {e}");
                false
            }
        }
    }
}
