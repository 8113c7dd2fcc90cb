//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `CredentialBundle` / `UserIdentity`: tokens and the identity they carry
//! - `TokenStore`: encoded persistence of the bundle in a secure backend
//! - `IdentityProvider`: the boundary to the identity service, with the
//!   Cognito implementation in `CognitoIdentityProvider`
//! - `SessionManager`: the session state machine
//!
//! Bundles are considered stale 5 minutes before their stated expiry.

mod cognito;
pub mod credentials;
pub mod provider;
pub mod session;
pub mod token_store;

pub use cognito::CognitoIdentityProvider;
pub use credentials::{CredentialBundle, UserIdentity, EXPIRY_BUFFER_MINUTES};
pub use provider::{IdentityProvider, SignInOutcome, SignUpResult};
pub use session::{SessionManager, SessionSnapshot, SessionState, SessionStatus};
pub use token_store::TokenStore;
