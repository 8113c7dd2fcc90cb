//! Resilient request execution.
//!
//! `RequestExecutor` wraps any outbound call with:
//! - bearer credentials from the `SessionManager`, refreshed up front when stale
//! - one refresh-and-repeat when the call comes back unauthorized
//! - bounded exponential backoff for rate limiting and transient failures,
//!   with a per-second countdown published as `RetryState`
//!
//! Waits can be cut short with a `CancellationToken`.

mod executor;
mod policy;

pub use executor::{
    RequestExecutor, RequestOptions, RetryState, DEFAULT_MAX_RETRIES, RATE_LIMIT_MAX_RETRIES,
};
pub use policy::{classify, RetryClass, RetryPolicy};
