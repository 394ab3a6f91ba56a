// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background cleanup task.
//
// Runs `GenerationEngine::cleanup` with the configured temp age on a fixed
// interval, retrying transient failures with backoff. Stops on `shutdown`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cardwerk_core::error::{CardwerkError, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::orchestrator::GenerationEngine;
use crate::retry::{RetryDecision, RetryPolicy, should_retry};

/// Handle to a running sweeper task.
pub struct Sweeper {
    shutdown_signal: Arc<Notify>,
    task_handle: JoinHandle<()>,
    sweeps: Arc<AtomicU64>,
}

impl Sweeper {
    /// Start sweeping every `interval`. The first sweep runs immediately.
    pub fn spawn(engine: Arc<GenerationEngine>, interval: Duration) -> Self {
        let shutdown_signal = Arc::new(Notify::new());
        let sweeps = Arc::new(AtomicU64::new(0));
        let task_handle = tokio::spawn(sweep_loop(
            engine,
            interval,
            Arc::clone(&shutdown_signal),
            Arc::clone(&sweeps),
        ));
        info!(interval_secs = interval.as_secs(), "sweeper started");
        Self {
            shutdown_signal,
            task_handle,
            sweeps,
        }
    }

    /// Sweeps finished so far, successful or not.
    pub fn completed_sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    /// Signal the loop to stop and wait for it. A sweep in progress is
    /// allowed to finish its current cleanup call.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_signal.notify_one();
        self.task_handle
            .await
            .map_err(|e| CardwerkError::Io(std::io::Error::other(format!("sweeper join: {e}"))))?;
        info!("sweeper stopped");
        Ok(())
    }
}

async fn sweep_loop(
    engine: Arc<GenerationEngine>,
    interval: Duration,
    shutdown: Arc<Notify>,
    sweeps: Arc<AtomicU64>,
) {
    let policy = RetryPolicy::from(&engine.config().sweeper);
    let older_than = Duration::from_secs(engine.config().storage.temp_max_age_hours * 3600);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("sweep loop received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                let stopped = sweep_once(&engine, older_than, &policy, &shutdown).await;
                sweeps.fetch_add(1, Ordering::Release);
                if stopped {
                    break;
                }
            }
        }
    }
}

/// One sweep with retries. Returns true when shutdown arrived while waiting
/// to retry.
async fn sweep_once(
    engine: &GenerationEngine,
    older_than: Duration,
    policy: &RetryPolicy,
    shutdown: &Notify,
) -> bool {
    let mut attempt = 0;
    loop {
        let err = match engine.cleanup(older_than).await {
            Ok(report) => {
                debug!(removed = report.total_removed(), bytes = report.bytes_freed, "sweep finished");
                return false;
            }
            Err(err) => err,
        };
        match should_retry(&err, attempt, policy) {
            RetryDecision::RetryAfter(delay) => {
                warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "sweep failed, retrying");
                tokio::select! {
                    _ = shutdown.notified() => return true,
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            RetryDecision::GiveUp(severity) => {
                warn!(error = %err, ?severity, "sweep failed, waiting for next interval");
                return false;
            }
            RetryDecision::Exhausted => {
                warn!(error = %err, attempt, "sweep retries exhausted");
                return false;
            }
        }
    }
}
