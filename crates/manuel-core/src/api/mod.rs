//! REST API client module for the Manuel backend.
//!
//! This module provides the `ApiClient` for listing and uploading manuals,
//! asking text and voice questions, and reading usage data.
//!
//! The API authenticates with the Cognito ID token sent as a bearer token.

pub mod client;

pub use client::{ApiClient, DEFAULT_HISTORY_LIMIT};
