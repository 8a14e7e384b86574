//! Bounded retry with linear backoff for network fetches
//!
//! Attempt `n` that fails with a transient error waits `n × step` before the
//! next one. After the last attempt the error is handed to the source gate.

use super::error::SourceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, step: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            step,
        }
    }
}

#[derive(Debug)]
pub struct LinearBackoff {
    step: Duration,
    max_attempts: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl LinearBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            step: policy.step,
            max_attempts: policy.attempts.max(1),
            current_attempt: 1,
        }
    }

    /// Wait before the next attempt, or fail once every attempt is used
    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_attempts {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.step * self.current_attempt;

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_attempts,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut backoff = LinearBackoff::new(policy);

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                log::warn!("⚠️  {} failed on attempt {}: {}", label, backoff.attempt(), e);
                if backoff.sleep().await.is_err() {
                    log::error!("❌ {} gave up after {} attempts", label, policy.attempts);
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
