//! OAuth2 for the Gmail API: installed-app client secret, persisted token,
//! refresh, and the one-time interactive consent flow.
//!
//! The token file uses the same JSON shape the Google Node client writes
//! (`expiry_date` in epoch milliseconds), so tokens from an earlier
//! authorization keep working.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::MailError;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Installed-app client credentials from the Google console download.
#[derive(Debug, Clone)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<RawClientSecret>,
    web: Option<RawClientSecret>,
}

#[derive(Deserialize)]
struct RawClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecret {
    /// Parse the console JSON (`{"installed": {...}}` or `{"web": {...}}`).
    pub fn parse(json: &str) -> Result<Self, MailError> {
        let file: ClientSecretFile =
            serde_json::from_str(json).map_err(|e| MailError::AuthFailed {
                reason: format!("invalid client secret file: {e}"),
            })?;

        let raw = file
            .installed
            .or(file.web)
            .ok_or_else(|| MailError::AuthFailed {
                reason: "client secret file has neither 'installed' nor 'web' section".into(),
            })?;

        let redirect_uri = raw
            .redirect_uris
            .into_iter()
            .next()
            .ok_or_else(|| MailError::AuthFailed {
                reason: "client secret file lists no redirect_uris".into(),
            })?;

        Ok(Self {
            client_id: raw.client_id,
            client_secret: SecretString::from(raw.client_secret),
            redirect_uri,
            auth_uri: raw.auth_uri.unwrap_or_else(|| DEFAULT_AUTH_URI.into()),
            token_uri: raw.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.into()),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, MailError> {
        let content = std::fs::read_to_string(path).map_err(|e| MailError::AuthFailed {
            reason: format!("cannot read client secret {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }
}

/// Token as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    /// Tokens without a recorded expiry are assumed valid until rejected.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_date
            .is_some_and(|expiry| expiry - EXPIRY_MARGIN_MS <= now_ms)
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>, now_ms: i64) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: self.expires_in.map(|secs| now_ms + secs * 1000),
        }
    }
}

/// Hands out valid access tokens, refreshing and persisting as needed.
pub struct OAuthClient {
    secret: ClientSecret,
    token_path: PathBuf,
    scopes: Vec<String>,
    http: reqwest::Client,
    cached: Mutex<Option<StoredToken>>,
}

impl OAuthClient {
    pub fn new(secret: ClientSecret, token_path: PathBuf, scopes: Vec<String>) -> Self {
        Self {
            secret,
            token_path,
            scopes,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Consent page the user must visit to authorize the mailbox.
    pub fn authorization_url(&self) -> Result<Url, MailError> {
        let scope = self.scopes.join(" ");
        Url::parse_with_params(
            &self.secret.auth_uri,
            &[
                ("client_id", self.secret.client_id.as_str()),
                ("redirect_uri", self.secret.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| MailError::AuthFailed {
            reason: format!("invalid auth_uri {}: {e}", self.secret.auth_uri),
        })
    }

    /// Return an access token, loading, refreshing or (on a terminal)
    /// re-authorizing as needed.
    pub async fn access_token(&self) -> Result<String, MailError> {
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            *cached = load_token(&self.token_path)?;
        }

        let now = Utc::now().timestamp_millis();
        let token = match cached.take() {
            Some(token) if !token.is_expired(now) => token,
            Some(token) => match self.refresh(&token).await {
                Ok(fresh) => fresh,
                Err(MailError::AuthFailed { reason }) => {
                    warn!("Stored token is no longer valid: {reason}");
                    self.authorize_if_interactive().await?
                }
                Err(e) => return Err(e),
            },
            None => self.authorize_if_interactive().await?,
        };

        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    /// Mark the current access token as rejected so the next
    /// [`access_token`](Self::access_token) call refreshes it, even if its
    /// recorded expiry has not passed.
    pub async fn invalidate(&self) -> Result<(), MailError> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = load_token(&self.token_path)?;
        }
        if let Some(token) = cached.as_mut() {
            token.expiry_date = Some(0);
        }
        Ok(())
    }

    /// Run the consent flow on the controlling terminal and persist the token.
    pub async fn authorize_interactive(&self) -> Result<StoredToken, MailError> {
        let url = self.authorization_url()?;
        eprintln!("Authorize this app by visiting this url: {url}");
        eprint!("Enter the code from the page here: ");

        let code = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| MailError::AuthFailed {
            reason: format!("reading authorization code failed: {e}"),
        })??;

        let code = code.trim();
        if code.is_empty() {
            return Err(MailError::AuthFailed {
                reason: "no authorization code entered".into(),
            });
        }

        let token = self.exchange_code(code).await?;
        store_token(&self.token_path, &token)?;
        info!(path = %self.token_path.display(), "Token stored");
        Ok(token)
    }

    async fn authorize_if_interactive(&self) -> Result<StoredToken, MailError> {
        if !std::io::stdin().is_terminal() {
            return Err(MailError::AuthFailed {
                reason: format!(
                    "no valid token at {}; run gmail-authorize first",
                    self.token_path.display()
                ),
            });
        }
        self.authorize_interactive().await
    }

    async fn exchange_code(&self, code: &str) -> Result<StoredToken, MailError> {
        let params = [
            ("code", code),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.expose_secret()),
            ("redirect_uri", self.secret.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let response = self.post_token(&params, "exchange authorization code").await?;
        Ok(response.into_stored(None, Utc::now().timestamp_millis()))
    }

    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, MailError> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(MailError::AuthFailed {
                reason: "token expired and has no refresh_token".into(),
            });
        };

        debug!("Refreshing Gmail access token");
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.post_token(&params, "refresh token").await?;
        let fresh = response.into_stored(token.refresh_token.clone(), Utc::now().timestamp_millis());
        store_token(&self.token_path, &fresh)?;
        Ok(fresh)
    }

    async fn post_token(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> Result<TokenResponse, MailError> {
        let resp = self
            .http
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| request_error(operation, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::AuthFailed {
                reason: format!("{operation} rejected ({status}): {body}"),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Request {
                operation: operation.into(),
                reason: format!("{status}: {body}"),
            });
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| MailError::InvalidResponse {
                operation: operation.into(),
                reason: e.to_string(),
            })
    }
}

/// Map a transport error, keeping timeouts distinct.
pub(crate) fn request_error(operation: &str, e: reqwest::Error) -> MailError {
    if e.is_timeout() {
        MailError::Timeout {
            operation: operation.into(),
        }
    } else {
        MailError::Request {
            operation: operation.into(),
            reason: e.to_string(),
        }
    }
}

/// Read a stored token. A missing file is `None`; an unreadable one is treated
/// the same so the caller re-authorizes.
pub fn load_token(path: &Path) -> Result<Option<StoredToken>, MailError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content) {
        Ok(token) => Ok(Some(token)),
        Err(e) => {
            warn!(path = %path.display(), "Ignoring unparseable token file: {e}");
            Ok(None)
        }
    }
}

/// Write a token, creating its directory if needed.
pub fn store_token(path: &Path, token: &StoredToken) -> Result<(), MailError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(token).map_err(|e| MailError::InvalidResponse {
        operation: "serialize token".into(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, json)?;
    Ok(())
}
