//! Manuel client core.
//!
//! Session management on top of a Cognito user pool, secure token
//! persistence, and a resilient client for the Manuel REST API.
//!
//! Construct one [`SessionManager`](auth::SessionManager) per process and
//! share it by `Arc` with the [`RequestExecutor`](retry::RequestExecutor)
//! and [`ApiClient`](api::ApiClient).

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod storage;

pub use error::{Error, ErrorKind, Result};
