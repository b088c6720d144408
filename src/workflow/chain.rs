//! The request chain started by one notification.
//!
//! A chain opens the notification's request link, quotes it if a form is
//! present, and otherwise treats the page as the pending-requests queue. After
//! every successful quote the browser lands back on the queue, which is
//! scanned again until it is drained or a quote lands somewhere else.
//!
//! Each stage is one call to [`RequestChain::step`], so transitions can be
//! driven and checked one at a time.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info};

use super::contact::{ContactSnapshot, contact_script, extract_contact};
use super::outcome::{ItemOutcome, classify_url, page_key, same_page};
use super::queue::{request_links_script, resolve_links};
use super::quote::QuoteMessage;
use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::error::BrowserError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Open a request page. `expect_form` is set for links taken from the
    /// queue, where a missing form is an error rather than a queue page.
    Navigate { url: String, expect_form: bool },
    Detect { expect_form: bool },
    FillQuote,
    Submitted,
    Classified(ItemOutcome),
    OpenQueue,
    ScanQueue,
    Done(ItemOutcome),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Navigate { .. } => "navigate",
            Stage::Detect { .. } => "detect",
            Stage::FillQuote => "fill_quote",
            Stage::Submitted => "submitted",
            Stage::Classified(_) => "classified",
            Stage::OpenQueue => "open_queue",
            Stage::ScanQueue => "scan_queue",
            Stage::Done(_) => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub outcome: ItemOutcome,
    pub quotes_sent: usize,
}

/// Workflow context for one chain: the session plus the links still to visit.
pub struct RequestChain<'a> {
    session: &'a dyn BrowserSession,
    settings: &'a Settings,
    pending: VecDeque<String>,
    /// Pages opened or queued, keyed by [`page_key`].
    visited: HashSet<String>,
    quotes_sent: usize,
}

impl<'a> RequestChain<'a> {
    pub fn new(session: &'a dyn BrowserSession, settings: &'a Settings) -> Self {
        Self {
            session,
            settings,
            pending: VecDeque::new(),
            visited: HashSet::new(),
            quotes_sent: 0,
        }
    }

    /// Drive the chain from `link` to a terminal outcome.
    pub async fn run(mut self, link: &str) -> Result<ChainReport, BrowserError> {
        self.visited.insert(page_key(link));
        let mut stage = Stage::Navigate {
            url: link.to_string(),
            expect_form: false,
        };

        loop {
            debug!(stage = stage.name(), "Chain step");
            stage = match stage {
                Stage::Done(outcome) => {
                    return Ok(ChainReport {
                        outcome,
                        quotes_sent: self.quotes_sent,
                    });
                }
                stage => self.step(stage).await?,
            };
        }
    }

    /// Perform one transition.
    pub async fn step(&mut self, stage: Stage) -> Result<Stage, BrowserError> {
        let settings = self.settings;
        let timing = &settings.browser;
        let selectors = &settings.site.selectors;

        match stage {
            Stage::Navigate { url, expect_form } => {
                info!(url = %url, "Opening request");
                self.session.goto(&url).await?;
                self.session.wait(timing.settle()).await?;
                // The link may have redirected; the queue lists the final page.
                let landed = self.session.url().await?;
                self.visited.insert(page_key(&landed));
                Ok(Stage::Detect { expect_form })
            }

            Stage::Detect { expect_form: true } => {
                self.session
                    .wait_for(&selectors.send_quote, timing.element_timeout())
                    .await?;
                Ok(Stage::FillQuote)
            }

            Stage::Detect { expect_form: false } => {
                if self.session.exists(&selectors.send_quote).await? {
                    Ok(Stage::FillQuote)
                } else {
                    debug!("No quote form on page");
                    Ok(Stage::OpenQueue)
                }
            }

            Stage::FillQuote => {
                self.fill_quote().await?;
                Ok(Stage::Submitted)
            }

            Stage::Submitted => {
                self.session.wait(timing.confirmation()).await?;
                let url = self.session.url().await?;
                let outcome = classify_url(&url, &settings.site);
                debug!(url = %url, outcome = ?outcome, "Quote submission landed");
                Ok(Stage::Classified(outcome))
            }

            // Success means the browser is back on the queue.
            Stage::Classified(ItemOutcome::Success) => Ok(Stage::ScanQueue),
            Stage::Classified(outcome) => Ok(Stage::Done(outcome)),

            Stage::OpenQueue => {
                let url = self.session.url().await?;
                if !same_page(&url, &settings.site.requests_url) {
                    self.session.click(&selectors.requests_nav).await?;
                    self.session.wait(timing.settle()).await?;
                }
                Ok(Stage::ScanQueue)
            }

            Stage::ScanQueue => {
                if self.pending.is_empty() {
                    self.scan_queue().await?;
                }
                Ok(match self.pending.pop_front() {
                    Some(url) => Stage::Navigate {
                        url,
                        expect_form: true,
                    },
                    None => {
                        info!(quotes_sent = self.quotes_sent, "Request queue drained");
                        Stage::Done(ItemOutcome::Success)
                    }
                })
            }

            Stage::Done(outcome) => Ok(Stage::Done(outcome)),
        }
    }

    async fn fill_quote(&mut self) -> Result<(), BrowserError> {
        let settings = self.settings;
        let timing = &settings.browser;
        let selectors = &settings.site.selectors;

        let value = self.session.evaluate(&contact_script(selectors)).await?;
        let snapshot: ContactSnapshot =
            serde_json::from_value(value).map_err(|e| BrowserError::Script {
                reason: format!("contact details: {e}"),
            })?;
        let contact = extract_contact(&snapshot).ok_or_else(|| BrowserError::ElementNotFound {
            selector: selectors.contact_name.clone(),
        })?;

        let quote = QuoteMessage::render(
            &settings.quote.template,
            &contact,
            &settings.quote,
        );

        self.session
            .insert(&selectors.quote_price, &quote.price_text())
            .await?;
        self.session.wait(timing.field_pause()).await?;
        self.session
            .insert(&selectors.quote_message, &quote.message)
            .await?;
        self.session.wait(timing.field_pause()).await?;
        self.session.click(&selectors.send_quote).await?;

        self.quotes_sent += 1;
        info!(student = %contact.name, city = %contact.city, "Quote submitted");
        Ok(())
    }

    /// Queue every listed request not yet seen in this chain.
    async fn scan_queue(&mut self) -> Result<(), BrowserError> {
        let value = self
            .session
            .evaluate(&request_links_script(&self.settings.site.selectors))
            .await?;
        let links = resolve_links(&self.settings.site.base_url, value)?;
        let listed = links.len();

        for link in links {
            if self.visited.insert(page_key(&link)) {
                self.pending.push_back(link);
            }
        }
        debug!(listed, queued = self.pending.len(), "Scanned request queue");
        Ok(())
    }
}
