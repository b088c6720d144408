//! W3C WebDriver client over reqwest (chromedriver, headless Chrome).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{BrowserLauncher, BrowserSession};
use crate::config::BrowserSettings;
use crate::error::BrowserError;

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How often `wait_for` re-checks for an element.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Error object from a failed WebDriver command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    pub error: String,
    pub message: String,
}

impl WireError {
    fn from_value(value: &Value) -> Self {
        let inner = value.get("value").unwrap_or(value);
        Self {
            error: inner
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            message: inner
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn into_browser_error(self, command: &str, timeout: Duration) -> BrowserError {
        match self.error.as_str() {
            "timeout" | "script timeout" => BrowserError::Timeout {
                command: command.to_string(),
                timeout,
            },
            "javascript error" => BrowserError::Script {
                reason: self.message,
            },
            _ => BrowserError::Command {
                command: command.to_string(),
                reason: format!("{}: {}", self.error, self.message),
            },
        }
    }
}

/// New-session payload for Chrome.
pub fn capabilities(settings: &BrowserSettings) -> Value {
    let mut args = vec![format!(
        "--window-size={},{}",
        settings.window_width, settings.window_height
    )];
    if settings.headless {
        args.push("--headless=new".into());
        args.push("--disable-gpu".into());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

/// Pull the element id out of a find-element result.
pub fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(String::from)
}

/// Launches sessions against a WebDriver endpoint.
pub struct WebDriverLauncher {
    settings: BrowserSettings,
    http: reqwest::Client,
}

impl WebDriverLauncher {
    pub fn new(settings: BrowserSettings) -> Result<Self, BrowserError> {
        let http = reqwest::Client::builder()
            .timeout(settings.command_timeout())
            .build()
            .map_err(|e| BrowserError::SessionFailed {
                reason: format!("HTTP client: {e}"),
            })?;
        Ok(Self { settings, http })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let base = self.settings.webdriver_url.trim_end_matches('/');
        let resp = self
            .http
            .post(format!("{base}/session"))
            .json(&capabilities(&self.settings))
            .send()
            .await
            .map_err(|e| BrowserError::SessionFailed {
                reason: format!("cannot reach WebDriver at {base}: {e}"),
            })?;

        let ok = resp.status().is_success();
        let body: Value = resp.json().await.map_err(|e| BrowserError::SessionFailed {
            reason: format!("invalid new-session response: {e}"),
        })?;
        if !ok {
            let wire = WireError::from_value(&body);
            return Err(BrowserError::SessionFailed {
                reason: format!("{}: {}", wire.error, wire.message),
            });
        }

        let session_id = body
            .pointer("/value/sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::SessionFailed {
                reason: "new-session response has no sessionId".into(),
            })?;

        debug!(session_id, "WebDriver session started");
        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            session_url: format!("{base}/session/{session_id}"),
            command_timeout: self.settings.command_timeout(),
        }))
    }
}

/// A live WebDriver session.
pub struct WebDriverSession {
    http: reqwest::Client,
    session_url: String,
    command_timeout: Duration,
}

impl WebDriverSession {
    /// Send a command. The outer error is transport, the inner one is the
    /// driver's own error object.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        command: &str,
    ) -> Result<Result<Value, WireError>, BrowserError> {
        let url = format!("{}{path}", self.session_url);
        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BrowserError::Timeout {
                    command: command.to_string(),
                    timeout: self.command_timeout,
                }
            } else {
                BrowserError::Command {
                    command: command.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let ok = resp.status().is_success();
        let value: Value = resp.json().await.map_err(|e| BrowserError::Command {
            command: command.to_string(),
            reason: format!("invalid response: {e}"),
        })?;

        if ok {
            Ok(Ok(value.get("value").cloned().unwrap_or(Value::Null)))
        } else {
            Ok(Err(WireError::from_value(&value)))
        }
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        command: &str,
    ) -> Result<Value, BrowserError> {
        self.send(method, path, body, command)
            .await?
            .map_err(|e| e.into_browser_error(command, self.command_timeout))
    }

    async fn find_element(&self, selector: &str) -> Result<String, BrowserError> {
        let body = json!({ "using": "css selector", "value": selector });
        match self
            .send(Method::POST, "/element", Some(body), "find element")
            .await?
        {
            Ok(value) => element_id(&value).ok_or_else(|| BrowserError::Command {
                command: "find element".into(),
                reason: "response has no element reference".into(),
            }),
            Err(wire) if wire.error == "no such element" => Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            }),
            Err(wire) => Err(wire.into_browser_error("find element", self.command_timeout)),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "Navigating");
        self.command(Method::POST, "/url", Some(json!({ "url": url })), "navigate")
            .await?;
        Ok(())
    }

    async fn wait(&self, duration: Duration) -> Result<(), BrowserError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(selector).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::ElementNotFound {
                    selector: selector.to_string(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self
            .command(Method::POST, "/elements", Some(body), "find elements")
            .await?;
        Ok(value.as_array().is_some_and(|elements| !elements.is_empty()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
            "execute script",
        )
        .await
    }

    async fn insert(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let id = self.find_element(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/clear"),
            Some(json!({})),
            "clear element",
        )
        .await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": text })),
            "send keys",
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let id = self.find_element(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/click"),
            Some(json!({})),
            "click",
        )
        .await?;
        Ok(())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/url", None, "get url").await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| BrowserError::Command {
                command: "get url".into(),
                reason: format!("expected string, got {value}"),
            })
    }

    async fn end(&self) -> Result<(), BrowserError> {
        if let Err(e) = self.command(Method::DELETE, "", None, "delete session").await {
            warn!("Failed to close WebDriver session: {e}");
            return Err(e);
        }
        debug!("WebDriver session closed");
        Ok(())
    }
}
