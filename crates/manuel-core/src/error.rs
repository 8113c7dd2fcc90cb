//! Error taxonomy shared by the session, retry and API layers.
//!
//! Provider and transport errors are translated into [`Error`] at the
//! boundary where they occur. Everything downstream branches on
//! [`Error::kind`] only.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for provider/response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Account already exists: {0}")]
    Conflict(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Account not confirmed: {0}")]
    NotConfirmed(String),

    #[error("Invalid or expired code: {0}")]
    InvalidCode(String),

    #[error("Too many attempts: {0}")]
    Throttled(String),

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited - retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Request failed: {0}")]
    Permanent(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Another authentication operation is already in progress")]
    ConcurrentOperation,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Copyable discriminant of [`Error`], used for branching and for the
/// `last_error` field of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidCredentials,
    NotConfirmed,
    InvalidCode,
    Throttled,
    SessionExpired,
    Unauthorized,
    Authentication,
    RateLimited,
    Transient,
    Permanent,
    Storage,
    ConcurrentOperation,
    Cancelled,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            Error::NotConfirmed(_) => ErrorKind::NotConfirmed,
            Error::InvalidCode(_) => ErrorKind::InvalidCode,
            Error::Throttled(_) => ErrorKind::Throttled,
            Error::SessionExpired => ErrorKind::SessionExpired,
            Error::Unauthorized => ErrorKind::Unauthorized,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Permanent(_) => ErrorKind::Permanent,
            Error::Storage(_) => ErrorKind::Storage,
            Error::ConcurrentOperation => ErrorKind::ConcurrentOperation,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::Conflict(_) => "An account with this email already exists".to_string(),
            Error::InvalidCredentials(_) => "Email or password incorrect".to_string(),
            Error::NotConfirmed(_) => {
                "Account not verified - check your email for a confirmation code".to_string()
            }
            Error::InvalidCode(_) => "The code is invalid or has expired".to_string(),
            Error::Throttled(_) => "Too many attempts - please wait and try again".to_string(),
            Error::SessionExpired => "Your session has expired - please sign in again".to_string(),
            Error::Authentication(_) => "Please sign in to continue".to_string(),
            Error::Unauthorized => "You are not signed in".to_string(),
            Error::RateLimited {
                retry_after: Some(wait),
            } => format!(
                "Too many requests - please wait {} seconds",
                wait.as_secs().max(1)
            ),
            Error::RateLimited { retry_after: None } => {
                "Too many requests - please wait a moment".to_string()
            }
            Error::Transient(_) => "The service is unavailable - please try again".to_string(),
            Error::Permanent(msg) => msg.clone(),
            Error::Storage(_) => "Could not save session, please sign in again".to_string(),
            Error::ConcurrentOperation => {
                "Another sign-in is already in progress".to_string()
            }
            Error::Cancelled => "Cancelled".to_string(),
            Error::Config(msg) => format!("Configuration problem: {}", msg),
        }
    }

    /// Map a non-success HTTP status from the backend into the taxonomy.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let truncated = truncate_body(body);
        match status {
            401 => Error::Unauthorized,
            429 => Error::RateLimited { retry_after },
            408 | 500..=599 => Error::Transient(format!("Status {}: {}", status, truncated)),
            _ => Error::Permanent(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Translate a transport error. Timeouts and connection failures are
    /// transient, anything else is permanent.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Error::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            Error::from_status(status.as_u16(), &err.to_string(), None)
        } else {
            tracing::warn!(error = %err, "Unclassified transport error");
            Error::Permanent(err.to_string())
        }
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert_eq!(Error::from_status(401, "", None), Error::Unauthorized);
        assert_eq!(
            Error::from_status(429, "", Some(Duration::from_secs(4))),
            Error::RateLimited {
                retry_after: Some(Duration::from_secs(4))
            }
        );
        assert_eq!(Error::from_status(503, "down", None).kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status(408, "", None).kind(), ErrorKind::Transient);
        assert_eq!(Error::from_status(404, "missing", None).kind(), ErrorKind::Permanent);
        assert_eq!(Error::from_status(403, "", None).kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(truncate_body(short), short);

        let long = "x".repeat(2000);
        let truncated = truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("2000 total bytes"));
    }

    #[test]
    fn test_truncate_body_multibyte() {
        // 'é' is two bytes, so the cut must step back to a char boundary
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.contains("800 total bytes"));
    }

    #[test]
    fn test_user_messages_are_actionable() {
        assert_eq!(
            Error::InvalidCredentials("NotAuthorizedException".into()).user_message(),
            "Email or password incorrect"
        );
        assert!(Error::NotConfirmed(String::new())
            .user_message()
            .contains("check your email"));
        assert_eq!(
            Error::RateLimited {
                retry_after: Some(Duration::from_secs(12))
            }
            .user_message(),
            "Too many requests - please wait 12 seconds"
        );
        assert_eq!(
            Error::Storage("disk full".into()).user_message(),
            "Could not save session, please sign in again"
        );
    }
}
