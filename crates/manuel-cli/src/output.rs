//! Rendering results and errors for the terminal.

use std::process::ExitCode;

use manuel_core::ErrorKind;
use serde::Serialize;
use serde_json::json;

pub const EXIT_GENERAL: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_AUTH: u8 = 3;
pub const EXIT_API: u8 = 4;
pub const EXIT_SYSTEM: u8 = 5;

/// Writes either human text or JSON to stdout.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print `value` as JSON, or hand it to `human` for text rendering.
    pub fn emit<T, F>(&self, value: &T, human: F) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&T),
    {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if self.json {
            println!("{}", json!({ "ok": true, "message": message }));
        } else {
            println!("{}", message);
        }
    }

    /// Errors go to stderr in both modes so stdout stays parseable.
    pub fn error(&self, err: &anyhow::Error) {
        let (kind, message) = match err.downcast_ref::<manuel_core::Error>() {
            Some(core) => (Some(core.kind()), core.user_message()),
            None => (None, format!("{:#}", err)),
        };
        if self.json {
            eprintln!(
                "{}",
                json!({ "ok": false, "error": kind, "message": message })
            );
        } else {
            eprintln!("Error: {}", message);
        }
    }
}

pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(core) = err.downcast_ref::<manuel_core::Error>() {
        return match core.kind() {
            ErrorKind::Validation
            | ErrorKind::Conflict
            | ErrorKind::InvalidCode
            | ErrorKind::Config => EXIT_USAGE,
            ErrorKind::InvalidCredentials
            | ErrorKind::NotConfirmed
            | ErrorKind::SessionExpired
            | ErrorKind::Unauthorized
            | ErrorKind::Authentication
            | ErrorKind::ConcurrentOperation => EXIT_AUTH,
            ErrorKind::Throttled
            | ErrorKind::RateLimited
            | ErrorKind::Transient
            | ErrorKind::Permanent => EXIT_API,
            ErrorKind::Storage => EXIT_SYSTEM,
            ErrorKind::Cancelled => EXIT_GENERAL,
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return EXIT_SYSTEM;
    }
    EXIT_GENERAL
}

pub fn exit_status(result: &anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(exit_code(err)),
    }
}
