//! One-time Gmail authorization. Prints the consent URL, reads the code from
//! stdin and writes the token file the autoresponder uses.

use anyhow::Context;

use tutors_autoresponder::config::{Settings, SettingsSource};
use tutors_autoresponder::mail::{ClientSecret, OAuthClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let (settings, source) = Settings::load()?;
    if let SettingsSource::Defaults(path) = &source {
        tracing::warn!(path = %path.display(), "Settings file not found, using defaults");
    }
    let creds = &settings.credentials;

    let secret_path = creds.client_secret_path();
    let secret = ClientSecret::from_file(&secret_path)
        .with_context(|| format!("Failed to load client secret from {}", secret_path.display()))?;

    let client = OAuthClient::new(secret, creds.token_path(), settings.scopes.clone());
    client.authorize_interactive().await?;

    eprintln!("Token stored to {}", client.token_path().display());
    Ok(())
}
