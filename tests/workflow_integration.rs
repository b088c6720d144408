//! End-to-end runs of the engine against an in-memory mailbox, site and
//! notifier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use tutors_autoresponder::browser::{BrowserLauncher, BrowserSession};
use tutors_autoresponder::config::{FilterSettings, Settings};
use tutors_autoresponder::error::{BrowserError, MailError, NotifyError};
use tutors_autoresponder::mail::{InboundNotification, Mailbox};
use tutors_autoresponder::notify::{ESCALATION_SUBJECT, Escalation, Notifier};
use tutors_autoresponder::scheduler::{self, RunGuard};
use tutors_autoresponder::workflow::{
    RunEngine, RunOutcome, contact_script, request_links_script,
};

const REQUESTS: &str = "https://tutors.com/pros/requests";
const PAYMENT: &str = "https://tutors.com/pros/payment";

// ── Mailbox ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeMailbox {
    inbox: Vec<InboundNotification>,
    archived: Mutex<Vec<String>>,
    reject_auth: bool,
}

impl FakeMailbox {
    fn with(inbox: Vec<InboundNotification>) -> Self {
        Self {
            inbox,
            ..Default::default()
        }
    }

    fn archived(&self) -> Vec<String> {
        self.archived.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn fetch_messages(
        &self,
        _filter: &FilterSettings,
    ) -> Result<Vec<InboundNotification>, MailError> {
        if self.reject_auth {
            return Err(MailError::AuthFailed {
                reason: "invalid_grant".into(),
            });
        }
        Ok(self.inbox.clone())
    }

    async fn archive_message(&self, id: &str) -> Result<(), MailError> {
        self.archived.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

fn notification(id: &str, link: &str) -> InboundNotification {
    InboundNotification {
        id: id.into(),
        html_body: format!(
            r#"<p>New request</p><a href="https://tutors.com/help">Help</a>
               <a class="btn" href="{link}">View Request</a>"#
        ),
        sender: "support@tutors.com".into(),
        subject: "Tutoring for SAT".into(),
    }
}

// ── Site ────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Page {
    /// A request page with a quote form; submitting it navigates to `lands_on`.
    Request {
        heading: Option<&'static str>,
        info: &'static str,
        lands_on: &'static str,
    },
    /// Anything without a form.
    Plain,
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, Page>,
    /// Server-side redirects applied on navigation.
    redirects: HashMap<String, String>,
    /// Hrefs listed on the requests queue.
    listing: Vec<&'static str>,
    current: String,
    visits: Vec<String>,
    inserts: Vec<(String, String)>,
    submitted: Vec<String>,
    ended: usize,
}

/// One shared site; every launched session drives the same state.
#[derive(Clone)]
struct FakeSite {
    state: Arc<Mutex<SiteState>>,
    settings: Arc<Settings>,
}

impl FakeSite {
    fn new(settings: Arc<Settings>) -> Self {
        let site = Self {
            state: Arc::new(Mutex::new(SiteState::default())),
            settings,
        };
        site.page(REQUESTS, Page::Plain);
        site
    }

    fn page(&self, url: &str, page: Page) {
        self.state.lock().unwrap().pages.insert(url.into(), page);
    }

    fn request(&self, url: &str, heading: &'static str, lands_on: &'static str) {
        self.page(
            url,
            Page::Request {
                heading: Some(heading),
                info: "Miami, FL area",
                lands_on,
            },
        );
    }

    fn redirect(&self, from: &str, to: &str) {
        self.state
            .lock()
            .unwrap()
            .redirects
            .insert(from.into(), to.into());
    }

    fn list(&self, hrefs: &[&'static str]) {
        self.state.lock().unwrap().listing = hrefs.to_vec();
    }

    fn current_page(&self) -> Option<Page> {
        let state = self.state.lock().unwrap();
        state.pages.get(&state.current).cloned()
    }

    fn has_form(&self) -> bool {
        matches!(self.current_page(), Some(Page::Request { .. }))
    }

    fn snapshot<T>(&self, f: impl FnOnce(&SiteState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl BrowserSession for FakeSite {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.visits.push(url.to_string());
        state.current = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn wait(&self, _duration: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        if self.exists(selector).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                selector: selector.into(),
            })
        }
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        let form_selectors = &self.settings.site.selectors;
        if selector == form_selectors.send_quote
            || selector == form_selectors.quote_price
            || selector == form_selectors.quote_message
        {
            return Ok(self.has_form());
        }
        Ok(false)
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let selectors = &self.settings.site.selectors;
        if script == contact_script(selectors) {
            return Ok(match self.current_page() {
                Some(Page::Request { heading, info, .. }) => {
                    json!({ "heading": heading, "info": info })
                }
                _ => json!({ "heading": null, "info": null }),
            });
        }
        if script == request_links_script(selectors) {
            let state = self.state.lock().unwrap();
            return Ok(if state.current == REQUESTS {
                json!(state.listing)
            } else {
                json!([])
            });
        }
        Err(BrowserError::Script {
            reason: "unknown script".into(),
        })
    }

    async fn insert(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        if !self.has_form() {
            return Err(BrowserError::ElementNotFound {
                selector: selector.into(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .inserts
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let selectors = &self.settings.site.selectors;
        let page = self.current_page();
        let mut state = self.state.lock().unwrap();

        if selector == selectors.requests_nav {
            state.current = REQUESTS.into();
            return Ok(());
        }
        match page {
            Some(Page::Request { lands_on, .. }) if selector == selectors.send_quote => {
                let from = std::mem::replace(&mut state.current, lands_on.to_string());
                state.submitted.push(from);
                Ok(())
            }
            _ => Err(BrowserError::ElementNotFound {
                selector: selector.into(),
            }),
        }
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    async fn end(&self) -> Result<(), BrowserError> {
        self.state.lock().unwrap().ended += 1;
        Ok(())
    }
}

struct FakeLauncher {
    site: FakeSite,
    launches: AtomicUsize,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.site.clone()))
    }
}

// ── Notifier ────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Escalation>>,
    fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn account(&self) -> &str {
        "tutor@example.com"
    }

    async fn notify(&self, escalation: &Escalation) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(escalation.clone());
        if self.fail {
            return Err(NotifyError::SendFailed {
                to: escalation.to.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

fn fast_settings() -> Arc<Settings> {
    let mut settings = Settings::default();
    settings.browser.settle_ms = 0;
    settings.browser.field_pause_ms = 0;
    settings.browser.confirmation_ms = 0;
    settings.browser.element_timeout_ms = 0;
    Arc::new(settings)
}

struct Harness {
    mailbox: Arc<FakeMailbox>,
    launcher: Arc<FakeLauncher>,
    notifier: Arc<RecordingNotifier>,
    site: FakeSite,
    engine: Arc<RunEngine>,
}

impl Harness {
    fn new(
        settings: Arc<Settings>,
        site: FakeSite,
        mailbox: FakeMailbox,
        notifier: RecordingNotifier,
    ) -> Self {
        let mailbox = Arc::new(mailbox);
        let notifier = Arc::new(notifier);
        let launcher = Arc::new(FakeLauncher {
            site: site.clone(),
            launches: AtomicUsize::new(0),
        });
        let engine = Arc::new(RunEngine::new(
            settings,
            mailbox.clone(),
            launcher.clone(),
            notifier.clone(),
        ));
        Self {
            mailbox,
            launcher,
            notifier,
            site,
            engine,
        }
    }

    fn launches(&self) -> usize {
        self.launcher.launches.load(Ordering::SeqCst)
    }

    fn ended(&self) -> usize {
        self.site.snapshot(|s| s.ended)
    }

    fn escalations(&self) -> Vec<Escalation> {
        self.notifier.sent.lock().unwrap().clone()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_inbox_never_opens_browser() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    let h = Harness::new(
        settings,
        site,
        FakeMailbox::default(),
        RecordingNotifier::default(),
    );

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::NoEmails);
    assert_eq!(h.launches(), 0);
    assert_eq!(h.ended(), 0);
    assert!(h.escalations().is_empty());
}

#[tokio::test]
async fn every_handled_notification_is_archived_once() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    site.request("https://tutors.com/pros/requests/12", "Sam Lee", REQUESTS);
    let mailbox = FakeMailbox::with(vec![
        notification("msg-1", "https://tutors.com/pros/requests/11"),
        notification("msg-2", "https://tutors.com/pros/requests/12"),
    ]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.quotes_sent, 2);
    assert_eq!(h.mailbox.archived(), vec!["msg-1", "msg-2"]);
    assert_eq!(report.archived, vec!["msg-1", "msg-2"]);
    assert_eq!(h.launches(), 1);
    assert_eq!(h.ended(), 1);
    assert!(h.escalations().is_empty());
}

#[tokio::test]
async fn quote_form_gets_remote_price_and_personal_message() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    h.engine.run().await.unwrap();

    let inserts = h.site.snapshot(|s| s.inserts.clone());
    assert_eq!(inserts.len(), 2);
    assert_eq!(inserts[0], ("#quote-price".to_string(), "60".to_string()));
    assert_eq!(inserts[1].0, "#quote-message");
    let message = &inserts[1].1;
    assert!(message.starts_with("Dear Jane Smith,"));
    assert!(message.contains("in Miami for $100/hour"));
    assert!(message.contains("$60/hour"));
    assert!(!message.contains("<<"));
}

#[tokio::test]
async fn paywall_escalates_once_and_keeps_notification() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", PAYMENT);
    site.request("https://tutors.com/pros/requests/12", "Sam Lee", REQUESTS);
    let mailbox = FakeMailbox::with(vec![
        notification("msg-1", "https://tutors.com/pros/requests/11"),
        notification("msg-2", "https://tutors.com/pros/requests/12"),
    ]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::PaymentRequired);
    assert!(report.escalated);
    assert!(h.mailbox.archived().is_empty());

    let escalations = h.escalations();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].to, "admin@example.com");
    assert_eq!(escalations[0].subject, ESCALATION_SUBJECT);
    assert!(escalations[0].body.contains("tutor@example.com"));

    // The run stops at the paywall.
    let visits = h.site.snapshot(|s| s.visits.clone());
    assert!(!visits.contains(&"https://tutors.com/pros/requests/12".to_string()));
    assert_eq!(h.ended(), 1);
}

#[tokio::test]
async fn failed_escalation_keeps_payment_outcome() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", PAYMENT);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11",
    )]);
    let notifier = RecordingNotifier {
        fail: true,
        ..Default::default()
    };
    let h = Harness::new(settings, site, mailbox, notifier);

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::PaymentRequired);
    assert!(!report.escalated);
    assert_eq!(
        report.status_message(),
        "Payment is necessary, but the admin could not be notified."
    );
    assert_eq!(h.escalations().len(), 1);
    assert_eq!(h.ended(), 1);
}

#[tokio::test]
async fn unexpected_landing_page_stops_without_archiving() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request(
        "https://tutors.com/pros/requests/11",
        "Jane A. Smith",
        "https://tutors.com/pros/error",
    );
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::UnexpectedState);
    assert_eq!(report.outcome.exit_code(), 3);
    assert!(h.mailbox.archived().is_empty());
    assert!(h.escalations().is_empty());
    assert_eq!(h.ended(), 1);
}

#[tokio::test]
async fn browser_error_still_ends_session() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.page(
        "https://tutors.com/pros/requests/11",
        Page::Request {
            heading: None,
            info: "Miami, FL",
            lands_on: REQUESTS,
        },
    );
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let err = h.engine.run().await.unwrap_err();

    assert!(err.to_string().contains("not found"));
    assert!(h.mailbox.archived().is_empty());
    assert_eq!(h.ended(), 1);
}

#[tokio::test]
async fn page_without_form_drains_request_queue() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.page("https://tutors.com/pros/dashboard", Page::Plain);
    site.request("https://tutors.com/pros/requests/21", "Ana B. Cruz", REQUESTS);
    site.request("https://tutors.com/pros/requests/22", "Leo Park", REQUESTS);
    // Quoted requests stay listed; each must still be quoted only once.
    site.list(&["/pros/requests/21", "/pros/requests/22"]);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/dashboard",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.quotes_sent, 2);
    assert_eq!(
        h.site.snapshot(|s| s.submitted.clone()),
        vec![
            "https://tutors.com/pros/requests/21",
            "https://tutors.com/pros/requests/22",
        ]
    );
    assert_eq!(h.mailbox.archived(), vec!["msg-1"]);
    assert_eq!(h.ended(), 1);
}

#[tokio::test]
async fn quoting_drains_remaining_queue() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    site.request("https://tutors.com/pros/requests/30", "Mia Chen", REQUESTS);
    site.list(&["/pros/requests/11", "/pros/requests/30"]);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.quotes_sent, 2);
    assert_eq!(
        h.site.snapshot(|s| s.submitted.clone()),
        vec![
            "https://tutors.com/pros/requests/11",
            "https://tutors.com/pros/requests/30",
        ]
    );
}

#[tokio::test]
async fn quoted_request_still_listed_is_not_requoted() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    site.list(&["/pros/requests/11"]);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.quotes_sent, 1);
    assert_eq!(
        h.site.snapshot(|s| s.visits.clone()),
        vec!["https://tutors.com/pros/requests/11"]
    );
    assert_eq!(h.mailbox.archived(), vec!["msg-1"]);
}

#[tokio::test]
async fn email_link_with_tracking_query_is_quoted_once() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request(
        "https://tutors.com/pros/requests/11?utm_source=email",
        "Jane A. Smith",
        REQUESTS,
    );
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    site.list(&["/pros/requests/11"]);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11?utm_source=email",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.quotes_sent, 1);
    assert_eq!(
        h.site.snapshot(|s| s.submitted.clone()),
        vec!["https://tutors.com/pros/requests/11?utm_source=email"]
    );
}

#[tokio::test]
async fn trailing_slash_link_is_quoted_once() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11/", "Jane A. Smith", REQUESTS);
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    site.list(&["/pros/requests/11"]);
    let mailbox = FakeMailbox::with(vec![notification(
        "msg-1",
        "https://tutors.com/pros/requests/11/",
    )]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.quotes_sent, 1);
    assert_eq!(
        h.site.snapshot(|s| s.submitted.clone()),
        vec!["https://tutors.com/pros/requests/11/"]
    );
}

#[tokio::test]
async fn redirected_link_is_quoted_once() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.redirect(
        "https://tutors.com/r/abc",
        "https://tutors.com/pros/requests/11",
    );
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    site.request("https://tutors.com/pros/requests/30", "Mia Chen", REQUESTS);
    site.list(&["/pros/requests/11", "/pros/requests/30"]);
    let mailbox = FakeMailbox::with(vec![notification("msg-1", "https://tutors.com/r/abc")]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.quotes_sent, 2);
    assert_eq!(
        h.site.snapshot(|s| s.submitted.clone()),
        vec![
            "https://tutors.com/pros/requests/11",
            "https://tutors.com/pros/requests/30",
        ]
    );
    assert_eq!(h.mailbox.archived(), vec!["msg-1"]);
}

#[tokio::test]
async fn notifications_without_links_never_open_browser() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    let mut first = notification("msg-0", "");
    first.html_body = "<p>Your weekly summary</p>".into();
    let mut second = notification("msg-1", "");
    second.html_body = "<p>Profile tips</p>".into();
    let mailbox = FakeMailbox::with(vec![first, second]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.skipped, vec!["msg-0", "msg-1"]);
    assert!(report.archived.is_empty());
    assert_eq!(h.launches(), 0);
    assert_eq!(h.ended(), 0);
}

#[tokio::test]
async fn notification_without_link_is_skipped() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    site.request("https://tutors.com/pros/requests/11", "Jane A. Smith", REQUESTS);
    let mut broken = notification("msg-0", "");
    broken.html_body = "<p>Your weekly summary</p>".into();
    let mailbox = FakeMailbox::with(vec![
        broken,
        notification("msg-1", "https://tutors.com/pros/requests/11"),
    ]);
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let report = h.engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AllHandled);
    assert_eq!(report.skipped, vec!["msg-0"]);
    assert_eq!(h.mailbox.archived(), vec!["msg-1"]);
}

#[tokio::test]
async fn auth_failure_aborts_before_browser() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    let mailbox = FakeMailbox {
        reject_auth: true,
        ..Default::default()
    };
    let h = Harness::new(settings, site, mailbox, RecordingNotifier::default());

    let err = h.engine.run().await.unwrap_err();

    assert!(err.is_auth_failure());
    assert_eq!(h.launches(), 0);
}

#[tokio::test]
async fn busy_guard_skips_fire() {
    let settings = fast_settings();
    let site = FakeSite::new(settings.clone());
    let h = Harness::new(
        settings,
        site,
        FakeMailbox::default(),
        RecordingNotifier::default(),
    );
    let guard = RunGuard::new();

    let permit = guard.try_acquire().unwrap();
    assert!(scheduler::fire(&h.engine, &guard).is_none());
    drop(permit);

    let handle = scheduler::fire(&h.engine, &guard).expect("guard is free");
    handle.await.unwrap();
    assert!(!guard.is_running());
}
