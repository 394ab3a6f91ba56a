// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Exponential backoff for background maintenance.
//
// Only errors whose operator notice is `Transient` are retried; anything that
// needs a person (disk full, bad config) or will never succeed gives up at
// once.

use std::time::Duration;

use cardwerk_core::config::SweeperConfig;
use cardwerk_core::error::CardwerkError;
use cardwerk_core::human_errors::{Severity, describe_error};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&SweeperConfig> for RetryPolicy {
    fn from(config: &SweeperConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SweeperConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(Severity),
    Exhausted,
}

/// Decide what to do after `attempt` (zero-based) failed with `err`.
pub fn should_retry(err: &CardwerkError, attempt: u32, policy: &RetryPolicy) -> RetryDecision {
    match describe_error(err).severity {
        Severity::Transient if attempt >= policy.max_retries => {
            warn!(attempt, max = policy.max_retries, "retry limit exhausted");
            RetryDecision::Exhausted
        }
        Severity::Transient => {
            let delay = compute_delay(attempt, policy);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling retry");
            RetryDecision::RetryAfter(delay)
        }
        severity => {
            info!(?severity, "not retrying");
            RetryDecision::GiveUp(severity)
        }
    }
}

/// min(base * 2^attempt + jitter, max). Jitter is a fixed spread in
/// [0, base) derived from the attempt number.
fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base_ms = policy.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter_ms = u64::from(attempt).wrapping_mul(6364136223846793005) % base_ms.max(1);
    let capped = exp_ms
        .saturating_add(jitter_ms)
        .min(policy.max_delay.as_millis() as u64);
    Duration::from_millis(capped)
}
