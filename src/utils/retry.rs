//! Retry policy for transient failures
//!
//! A [`RetryPolicy`] is an explicit value: how often to try, how long to
//! wait between attempts and which errors are worth another attempt. Waits
//! go through the [`ShutdownSignal`] so a pending retry never blocks exit.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::shutdown::ShutdownSignal;
use crate::error::{Disposition, Error, Result};

/// Decides whether an error warrants another attempt
pub type Classifier = fn(&Error) -> bool;

/// Default classifier: retry everything with [`Disposition::Retry`]
pub fn is_transient(err: &Error) -> bool {
    err.disposition() == Disposition::Retry
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, `None` for unbounded
    pub max_attempts: Option<u32>,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Cap for growing delays
    pub max_delay: Duration,

    /// Growth factor between attempts (1.0 = fixed delay)
    pub backoff_multiplier: f64,

    pub classifier: Classifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            classifier: is_transient,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between a bounded number of attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            base_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            classifier: is_transient,
        }
    }

    /// Fixed delay, retried until success or a non-transient error
    pub fn forever(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            ..Self::fixed(1, delay)
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Delay after `attempt` failed attempts
    fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi((attempt - 1) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Run `operation` until it succeeds, fails permanently or attempts run out
    pub async fn run<T, F, Fut>(&self, shutdown: &ShutdownSignal, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;

        loop {
            if attempts > 0 {
                let delay = self.delay_for(attempts);
                debug!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying operation after delay"
                );
                shutdown.sleep(delay).await?;
            }

            match operation().await {
                Ok(value) => {
                    if attempts > 0 {
                        debug!(attempt = attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    attempts += 1;
                    if !(self.classifier)(&e) {
                        debug!(error = %e, "Non-retryable error encountered");
                        return Err(e);
                    }
                    if self.exhausted(attempts) {
                        warn!(attempts = attempts, error = %e, "Retries exhausted");
                        return Err(e);
                    }
                    warn!(
                        attempt = attempts,
                        max_attempts = ?self.max_attempts,
                        category = e.category().as_str(),
                        error = %e,
                        "Operation failed, will retry"
                    );
                }
            }
        }
    }
}
