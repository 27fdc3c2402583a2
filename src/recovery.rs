//! Bounded retry with exponential backoff.
//!
//! `RecoveryPolicy::run` wraps one fallible async operation and always
//! hands back a tagged [`Recovered`] value: either the success, or the
//! last error after `max_attempts` consecutive failures. Nothing is
//! re-raised; the caller decides what a terminal failure means.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_BACKOFF: f64 = 2.0;

/// Invalid policy parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff must be a finite number >= 1.0, got {0}")]
    InvalidBackoff(f64),
}

/// Retry bound and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: f64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What a policy run produced.
#[derive(Debug)]
pub enum Recovered<T, E> {
    Success {
        value: T,
        attempts: u32,
        waited: Duration,
    },
    Failure {
        last_error: E,
        attempts: u32,
        waited: Duration,
    },
}

impl<T, E> Recovered<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Recovered::Success { attempts, .. } | Recovered::Failure { attempts, .. } => *attempts,
        }
    }

    /// Total time spent sleeping between attempts.
    pub fn waited(&self) -> Duration {
        match self {
            Recovered::Success { waited, .. } | Recovered::Failure { waited, .. } => *waited,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Recovered::Success { .. })
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Recovered::Success { value, .. } => Ok(value),
            Recovered::Failure { last_error, .. } => Err(last_error),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

impl RecoveryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: f64) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !backoff.is_finite() || backoff < 1.0 {
            return Err(PolicyError::InvalidBackoff(backoff));
        }
        Ok(Self {
            max_attempts,
            delay,
            backoff,
        })
    }

    /// Single attempt, no sleeping.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            backoff: 1.0,
        }
    }

    /// Exact total sleep for an operation that never succeeds:
    /// the sum of the first `max_attempts - 1` delays.
    pub fn worst_case_delay(&self) -> Duration {
        let mut delay = self.delay;
        let mut total = Duration::ZERO;
        for _ in 1..self.max_attempts {
            total = total.saturating_add(delay);
            delay = self.scale(delay);
        }
        total
    }

    fn scale(&self, d: Duration) -> Duration {
        let nanos = (d.as_nanos() as f64 * self.backoff).round();
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64)
    }

    /// Run `op` until it succeeds or `max_attempts` is reached.
    ///
    /// `op` receives the 1-based attempt number. `label` names the
    /// operation in log lines.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Recovered<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut delay = self.delay;
        let mut waited = Duration::ZERO;
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Recovered after retry");
                    }
                    return Recovered::Success {
                        value,
                        attempts: attempt,
                        waited,
                    };
                }
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        label,
                        attempts = attempt,
                        error = %e,
                        "Giving up after max attempts"
                    );
                    return Recovered::Failure {
                        last_error: e,
                        attempts: attempt,
                        waited,
                    };
                }
                Err(e) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                    delay = self.scale(delay);
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
