//! Configuration types and loading.
//!
//! Settings come from a JSON file (default `./settings.json`, overridden by
//! `AUTORESPONDER_CONFIG`). Every field has a default, so a partial file or
//! no file at all is valid. A handful of environment variables override the
//! file for deployment convenience.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder replaced by the student's first name.
pub const CLIENT_NAME_TOKEN: &str = "<<CLIENT_NAME>>";
/// Placeholder replaced by the student's city.
pub const CLIENT_CITY_TOKEN: &str = "<<CLIENT_CITY>>";
/// Placeholder replaced by the in-person hourly rate.
pub const QUOTE_IN_PERSON_TOKEN: &str = "<<QUOTE_IN_PERSON>>";
/// Placeholder replaced by the remote hourly rate.
pub const QUOTE_REMOTE_TOKEN: &str = "<<QUOTE_REMOTE>>";

const DEFAULT_CONFIG_PATH: &str = "./settings.json";

const DEFAULT_TEMPLATE: &str = "Dear <<CLIENT_NAME>>,\n\n\
Thank you for reaching out about tutoring. We start every student with a free \
diagnostic test, then build a personalized plan around their weak points.\n\n\
We offer in-person tutoring in <<CLIENT_CITY>> for $<<QUOTE_IN_PERSON>>/hour, \
and online tutoring at the more affordable rate of $<<QUOTE_REMOTE>>/hour. \
Do you have time today or tomorrow for a quick call so we can learn more about \
your goals?";

/// Top-level autoresponder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Credential directory layout.
    #[serde(default)]
    pub credentials: CredentialSettings,

    /// Address escalation emails are sent to.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    /// Which inbox messages count as request notifications.
    #[serde(default)]
    pub filter: FilterSettings,

    /// Prices and message template for quotes.
    #[serde(default)]
    pub quote: QuoteSettings,

    /// OAuth scopes requested when authorizing the mailbox.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Marketplace URLs and page selectors.
    #[serde(default)]
    pub site: SiteSettings,

    /// WebDriver endpoint and timing.
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Six-field cron expression. `None` runs a single pass and exits.
    #[serde(default = "default_schedule")]
    pub schedule: Option<String>,

    /// Directory for a daily-rolling log file, in addition to stderr.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSettings {
    /// Root directory, without trailing slash.
    #[serde(default = "default_credential_dir")]
    pub credential_dir: PathBuf,

    /// Google installed-app client secret filename (under `google/`).
    #[serde(default = "default_credential_google")]
    pub credential_google: String,

    /// SMTP credentials filename (under `smtp/`).
    #[serde(default = "default_credential_smtp")]
    pub credential_smtp: String,

    /// OAuth token filename (under `google/token/`).
    #[serde(default = "default_token_file")]
    pub token_file: String,
}

impl CredentialSettings {
    pub fn client_secret_path(&self) -> PathBuf {
        self.credential_dir
            .join("google")
            .join(&self.credential_google)
    }

    pub fn token_path(&self) -> PathBuf {
        self.credential_dir
            .join("google")
            .join("token")
            .join(&self.token_file)
    }

    pub fn smtp_path(&self) -> PathBuf {
        self.credential_dir.join("smtp").join(&self.credential_smtp)
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            credential_dir: default_credential_dir(),
            credential_google: default_credential_google(),
            credential_smtp: default_credential_smtp(),
            token_file: default_token_file(),
        }
    }
}

/// Inbox query filter for notification emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSettings {
    #[serde(default = "default_filter_from")]
    pub from: String,

    #[serde(default = "default_filter_subject")]
    pub subject: String,

    /// Empty matches any recipient.
    #[serde(default)]
    pub to: String,

    #[serde(default = "default_true")]
    pub unread_only: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            from: default_filter_from(),
            subject: default_filter_subject(),
            to: String::new(),
            unread_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSettings {
    /// Hourly rate for in-person sessions.
    #[serde(default = "default_in_person")]
    pub in_person: Decimal,

    /// Hourly rate for remote sessions; also entered in the price field.
    #[serde(default = "default_remote")]
    pub remote: Decimal,

    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            in_person: default_in_person(),
            remote: default_remote(),
            template: default_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    /// Prefix for relative request links scraped from the queue page.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Landing page after a successful quote; also the pending-requests queue.
    #[serde(default = "default_requests_url")]
    pub requests_url: String,

    /// Landing page when the account must pay before quoting.
    #[serde(default = "default_payment_url")]
    pub payment_url: String,

    #[serde(default)]
    pub selectors: Selectors,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            requests_url: default_requests_url(),
            payment_url: default_payment_url(),
            selectors: Selectors::default(),
        }
    }
}

/// CSS selectors for the marketplace pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selectors {
    pub send_quote: String,
    pub quote_price: String,
    pub quote_message: String,
    pub requests_nav: String,
    pub request_box: String,
    pub request_head: String,
    pub contact_name: String,
    pub contact_info: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            send_quote: "#send-quote".into(),
            quote_price: "#quote-price".into(),
            quote_message: "#quote-message".into(),
            requests_nav: "#header-requests a".into(),
            request_box: ".request-box".into(),
            request_head: ".request-head".into(),
            contact_name: ".client-lead-customer .media-heading".into(),
            contact_info: ".client-lead-customer .client-lead-customer-info".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
    /// chromedriver (or any W3C WebDriver) endpoint.
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Blind wait after each navigation.
    pub settle_ms: u64,
    /// Pause between filling individual form fields.
    pub field_pause_ms: u64,
    /// Wait after submitting a quote before reading the location.
    pub confirmation_ms: u64,
    /// Upper bound when waiting for an element that must appear.
    pub element_timeout_ms: u64,
    /// HTTP timeout for a single WebDriver command.
    pub command_timeout_secs: u64,
}

impl BrowserSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn field_pause(&self) -> Duration {
        Duration::from_millis(self.field_pause_ms)
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_millis(self.confirmation_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            window_width: 1920,
            window_height: 1080,
            settle_ms: 3000,
            field_pause_ms: 1000,
            confirmation_ms: 4000,
            element_timeout_ms: 30_000,
            command_timeout_secs: 60,
        }
    }
}

fn default_admin_email() -> String {
    "admin@example.com".into()
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/gmail.modify".into()]
}

fn default_schedule() -> Option<String> {
    Some("0 */10 * * * *".into())
}

fn default_credential_dir() -> PathBuf {
    PathBuf::from("./credentials")
}

fn default_credential_google() -> String {
    "client_secret.json".into()
}

fn default_credential_smtp() -> String {
    "smtp_credentials.json".into()
}

fn default_token_file() -> String {
    "token.json".into()
}

fn default_filter_from() -> String {
    "support@tutors.com".into()
}

fn default_filter_subject() -> String {
    "Tutoring for".into()
}

fn default_true() -> bool {
    true
}

fn default_in_person() -> Decimal {
    dec!(100)
}

fn default_remote() -> Decimal {
    dec!(60)
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.into()
}

fn default_base_url() -> String {
    "https://tutors.com".into()
}

fn default_requests_url() -> String {
    "https://tutors.com/pros/requests".into()
}

fn default_payment_url() -> String {
    "https://tutors.com/pros/payment".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: CredentialSettings::default(),
            admin_email: default_admin_email(),
            filter: FilterSettings::default(),
            quote: QuoteSettings::default(),
            scopes: default_scopes(),
            site: SiteSettings::default(),
            browser: BrowserSettings::default(),
            schedule: default_schedule(),
            log_dir: None,
        }
    }
}

/// Where [`Settings::load`] found its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    File(PathBuf),
    /// No file at this path; built-in defaults were used.
    Defaults(PathBuf),
}

impl Settings {
    /// Load settings from `AUTORESPONDER_CONFIG` (or `./settings.json`),
    /// apply environment overrides, and validate.
    ///
    /// Runs before logging is set up, so the caller reports the returned
    /// [`SettingsSource`].
    pub fn load() -> Result<(Self, SettingsSource), ConfigError> {
        let path = std::env::var("AUTORESPONDER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// [`Settings::load`] against an explicit file and variable lookup. A
    /// missing file falls back to defaults.
    pub fn load_from<F>(path: &Path, lookup: F) -> Result<(Self, SettingsSource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut settings, source) = if path.exists() {
            (Self::from_file(path)?, SettingsSource::File(path.to_path_buf()))
        } else {
            (Self::default(), SettingsSource::Defaults(path.to_path_buf()))
        };

        settings.apply_overrides(lookup);
        settings.validate()?;
        Ok((settings, source))
    }

    /// Parse a settings file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(email) = lookup("AUTORESPONDER_ADMIN_EMAIL").filter(|s| !s.trim().is_empty()) {
            self.admin_email = email.trim().to_string();
        }
        if let Some(url) = lookup("AUTORESPONDER_WEBDRIVER_URL").filter(|s| !s.trim().is_empty()) {
            self.browser.webdriver_url = url.trim().to_string();
        }
        if let Some(schedule) = lookup("AUTORESPONDER_SCHEDULE") {
            let schedule = schedule.trim();
            self.schedule = if schedule.is_empty() {
                None
            } else {
                Some(schedule.to_string())
            };
        }
        if let Some(dir) = lookup("AUTORESPONDER_LOG_DIR").filter(|s| !s.trim().is_empty()) {
            self.log_dir = Some(PathBuf::from(dir.trim()));
        }
    }

    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .admin_email
            .parse::<lettre::message::Mailbox>()
            .is_err()
        {
            return Err(invalid("adminEmail", format!("not a valid address: {}", self.admin_email)));
        }

        if self.quote.in_person.is_sign_negative() {
            return Err(invalid("quote.inPerson", "must not be negative"));
        }
        if self.quote.remote.is_sign_negative() {
            return Err(invalid("quote.remote", "must not be negative"));
        }

        for token in [
            CLIENT_NAME_TOKEN,
            CLIENT_CITY_TOKEN,
            QUOTE_IN_PERSON_TOKEN,
            QUOTE_REMOTE_TOKEN,
        ] {
            if !self.quote.template.contains(token) {
                return Err(invalid("quote.template", format!("missing placeholder {token}")));
            }
        }

        if let Some(schedule) = &self.schedule {
            cron::Schedule::from_str(schedule)
                .map_err(|e| invalid("schedule", format!("invalid cron '{schedule}': {e}")))?;
        }

        if self.scopes.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "scopes".into(),
                hint: "At least one Gmail OAuth scope is required.".into(),
            });
        }

        Ok(())
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}
