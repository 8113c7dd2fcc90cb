use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::Error;

/// How the executor should treat a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Token rejected; refresh once and repeat
    Unauthorized,
    /// Back off, honouring the server's hint when there is one
    RateLimited { retry_after: Option<Duration> },
    /// Back off exponentially
    Transient,
    /// Surface immediately
    Permanent,
}

/// Default classification of crate errors.
pub fn classify(err: &Error) -> RetryClass {
    match err {
        Error::Unauthorized => RetryClass::Unauthorized,
        Error::RateLimited { retry_after } => RetryClass::RateLimited {
            retry_after: *retry_after,
        },
        Error::Transient(_) => RetryClass::Transient,
        _ => RetryClass::Permanent,
    }
}

/// Backoff timing. Built from configuration; nothing here is hardcoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub rate_limit_max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            max_retries: config.max_retries,
            rate_limit_max_retries: config.rate_limit_max_retries,
        }
    }

    /// Exponential delay for the given retry number (1-based), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt`. A server-provided wait wins over
    /// the computed backoff; both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(self.max_delay),
            None => with_jitter(self.backoff(attempt)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Keep half the delay and randomize the other half.
fn with_jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread = half.as_millis() as u64;
    if spread == 0 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..=spread);
    half + Duration::from_millis(extra)
}
