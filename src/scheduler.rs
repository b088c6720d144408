//! Cron-driven runs with mutual exclusion.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::workflow::RunEngine;

/// Run-in-progress flag shared by every trigger.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of a run. Releases the guard on drop.
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` if a run is already in progress.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Next fire time strictly after `after`.
pub fn next_fire(schedule: &cron::Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

pub fn parse_schedule(expression: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(expression).map_err(|e| ConfigError::InvalidValue {
        key: "schedule".into(),
        message: format!("invalid cron '{expression}': {e}"),
    })
}

/// Spawn the scheduler loop. Each fire runs in its own task; a fire that
/// finds a run still in progress is skipped.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop firing.
pub fn spawn_cron_scheduler(
    engine: Arc<RunEngine>,
    schedule: cron::Schedule,
    guard: RunGuard,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = next_fire(&schedule, now) else {
                warn!("Schedule has no further fire times, scheduler stopping");
                return;
            };
            info!(next = %next, "Next run scheduled");

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Scheduler shutting down");
                return;
            }

            fire(&engine, &guard);
        }
    });

    (handle, shutdown_flag)
}

/// Start a run in the background if none is in progress.
pub fn fire(engine: &Arc<RunEngine>, guard: &RunGuard) -> Option<JoinHandle<()>> {
    let Some(permit) = guard.try_acquire() else {
        warn!("Previous run still in progress, skipping this tick");
        return None;
    };

    let engine = Arc::clone(engine);
    Some(tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = engine.run().await {
            if e.is_auth_failure() {
                error!("Mailbox authorization is invalid; run gmail-authorize to renew it");
            }
        }
    }))
}
