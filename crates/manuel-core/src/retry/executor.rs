use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::{classify, RetryClass, RetryPolicy};
use crate::auth::SessionManager;
use crate::error::{Error, Result};

/// Default retries for general requests
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retries at call sites that mostly see rate limiting
pub const RATE_LIMIT_MAX_RETRIES: u32 = 2;

/// Countdown shown while a request waits to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    pub is_retrying: bool,
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_retry_in_seconds: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub max_retries: u32,
    pub classify: fn(&Error) -> RetryClass,
}

impl RequestOptions {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            classify,
        }
    }

    pub fn rate_limited() -> Self {
        Self::new(RATE_LIMIT_MAX_RETRIES)
    }

    pub fn with_classifier(mut self, classify: fn(&Error) -> RetryClass) -> Self {
        self.classify = classify;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// Runs outbound calls with bearer attachment, one-shot reauthentication and
/// bounded backoff.
pub struct RequestExecutor {
    session: Arc<SessionManager>,
    policy: RetryPolicy,
    state: watch::Sender<RetryState>,
}

impl RequestExecutor {
    pub fn new(session: Arc<SessionManager>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(RetryState::default());
        Self {
            session,
            policy,
            state,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Options using the configured general retry count.
    pub fn general_options(&self) -> RequestOptions {
        RequestOptions::new(self.policy.max_retries)
    }

    /// Options using the configured rate-limit retry count.
    pub fn rate_limit_options(&self) -> RequestOptions {
        RequestOptions::new(self.policy.rate_limit_max_retries)
    }

    pub fn retry_state(&self) -> RetryState {
        *self.state.borrow()
    }

    pub fn subscribe_retry_state(&self) -> watch::Receiver<RetryState> {
        self.state.subscribe()
    }

    /// Execute one logical request.
    ///
    /// `request` receives the ID token to send as the bearer credential and
    /// is invoked again only after a failed attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        options: RequestOptions,
        cancel: &CancellationToken,
        mut request: F,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = self.run(options, cancel, &mut request).await;
        self.state.send_replace(RetryState::default());
        result
    }

    async fn run<T, F, Fut>(
        &self,
        options: RequestOptions,
        cancel: &CancellationToken,
        request: &mut F,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut credentials = self.session.valid_credentials().await?;
        let mut attempt: u32 = 0;
        let mut reauthenticated = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let err = match request(credentials.id_token.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match (options.classify)(&err) {
                RetryClass::Permanent => return Err(err),
                RetryClass::Unauthorized if reauthenticated => {
                    warn!("Request rejected again after token refresh");
                    return Err(Error::Authentication(
                        "Request was rejected after refreshing credentials".to_string(),
                    ));
                }
                RetryClass::Unauthorized => {
                    info!("Request unauthorized, refreshing credentials once");
                    reauthenticated = true;
                    credentials = self
                        .session
                        .refresh_if_unchanged(&credentials.id_token)
                        .await?;
                }
                RetryClass::RateLimited { retry_after } => {
                    attempt += 1;
                    if attempt > options.max_retries {
                        warn!(attempts = attempt, "Rate limited, giving up");
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt, retry_after);
                    warn!(retry = attempt, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
                    self.countdown(delay, attempt, options.max_retries, cancel)
                        .await?;
                    credentials = self.session.valid_credentials().await?;
                }
                RetryClass::Transient => {
                    attempt += 1;
                    if attempt > options.max_retries {
                        warn!(attempts = attempt, error = %err, "Transient failure, giving up");
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt, None);
                    warn!(retry = attempt, delay_ms = delay.as_millis() as u64, error = %err, "Transient failure, backing off");
                    self.countdown(delay, attempt, options.max_retries, cancel)
                        .await?;
                    credentials = self.session.valid_credentials().await?;
                }
            }
        }
    }

    /// Sleep for `delay`, publishing the remaining whole seconds once a second.
    async fn countdown(
        &self,
        delay: Duration,
        attempt: u32,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.state.send_replace(RetryState {
                is_retrying: true,
                attempt,
                max_attempts,
                next_retry_in_seconds: ceil_secs(remaining),
            });

            let tick = remaining.min(Duration::from_secs(1));
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(retry = attempt, "Retry wait cancelled");
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(tick) => {}
            }
        }
        self.state.send_modify(|s| s.next_retry_in_seconds = 0);
        Ok(())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
