//! Browser-automation collaborator.
//!
//! The workflow drives pages only through [`BrowserSession`], so the engine
//! can be exercised against an in-memory site in tests and against a real
//! WebDriver endpoint in production.

pub mod webdriver;

pub use webdriver::{WebDriverLauncher, WebDriverSession};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;

/// One exclusive browser session. Created at run start, ended at run end.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Blind timed wait.
    async fn wait(&self, duration: Duration) -> Result<(), BrowserError>;

    /// Poll until `selector` matches, failing with `ElementNotFound` after
    /// `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Run a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError>;

    /// Type `text` into the field matching `selector`.
    async fn insert(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Current page location.
    async fn url(&self) -> Result<String, BrowserError>;

    /// Close the session. Called exactly once per run.
    async fn end(&self) -> Result<(), BrowserError>;
}

/// Opens browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
