use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use tutors_autoresponder::browser::WebDriverLauncher;
use tutors_autoresponder::config::{Settings, SettingsSource};
use tutors_autoresponder::mail::{ClientSecret, GmailMailbox, OAuthClient};
use tutors_autoresponder::notify::{SmtpCredentials, SmtpNotifier};
use tutors_autoresponder::scheduler::{self, RunGuard};
use tutors_autoresponder::workflow::RunEngine;

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let (settings, source) = match Settings::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_tracing(&settings);
    if let SettingsSource::Defaults(path) = &source {
        tracing::warn!(path = %path.display(), "Settings file not found, using defaults");
    }

    eprintln!("📬 Tutors autoresponder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Admin: {}", settings.admin_email);
    eprintln!("   WebDriver: {}", settings.browser.webdriver_url);
    match &settings.schedule {
        Some(schedule) => eprintln!("   Schedule: {schedule}"),
        None => eprintln!("   Schedule: one-shot"),
    }

    match run(settings).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Stderr logging plus an optional daily-rolling file. The returned guard
/// flushes the file writer on drop.
fn init_tracing(settings: &Settings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tutors-autoresponder.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

async fn run(settings: Settings) -> anyhow::Result<ExitCode> {
    let settings = Arc::new(settings);
    let engine = Arc::new(build_engine(Arc::clone(&settings))?);

    match settings.schedule.as_deref() {
        None => Ok(run_once(&engine).await),
        Some(expression) => {
            run_scheduled(engine, expression).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_engine(settings: Arc<Settings>) -> anyhow::Result<RunEngine> {
    let creds = &settings.credentials;

    let secret = ClientSecret::from_file(&creds.client_secret_path())
        .context("Failed to load Google client secret")?;
    let oauth = Arc::new(OAuthClient::new(
        secret,
        creds.token_path(),
        settings.scopes.clone(),
    ));
    let mailbox = Arc::new(GmailMailbox::new(oauth));

    let smtp = SmtpCredentials::from_file(&creds.smtp_path())?;
    let notifier = Arc::new(SmtpNotifier::new(smtp));

    let launcher = Arc::new(WebDriverLauncher::new(settings.browser.clone())?);

    Ok(RunEngine::new(settings, mailbox, launcher, notifier))
}

/// Single pass; the outcome becomes the exit code.
async fn run_once(engine: &RunEngine) -> ExitCode {
    match engine.run().await {
        Ok(report) => ExitCode::from(report.outcome.exit_code()),
        Err(e) => {
            if e.is_auth_failure() {
                eprintln!("Mailbox authorization is invalid. Run `gmail-authorize` to renew it.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_scheduled(engine: Arc<RunEngine>, expression: &str) -> anyhow::Result<()> {
    let schedule = scheduler::parse_schedule(expression)?;
    let guard = RunGuard::new();
    let (handle, shutdown) =
        scheduler::spawn_cron_scheduler(engine, schedule, guard.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Ctrl+C received, shutting down...");
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();

    if guard.is_running() {
        tracing::info!("Waiting for the current run to finish (Ctrl+C again to force)");
        tokio::select! {
            _ = wait_idle(&guard) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Forced shutdown; the browser session may be left open");
            }
        }
    }
    Ok(())
}

async fn wait_idle(guard: &RunGuard) {
    while guard.is_running() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
