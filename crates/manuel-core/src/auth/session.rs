//! Process-wide authentication state.
//!
//! `SessionManager` is the only writer of the session state and of the
//! persisted credential bundle. Sign-in, sign-up, confirmation, refresh and
//! sign-out are serialized through one operation gate so token writes cannot
//! interleave.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::provider::{validate_code, validate_email, validate_password};
use super::{CredentialBundle, IdentityProvider, SignInOutcome, SignUpResult, TokenStore, UserIdentity};
use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Uninitialized,
    Restoring,
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub user: Option<UserIdentity>,
    pub credentials: Option<CredentialBundle>,
    pub is_loading: bool,
    pub last_error: Option<ErrorKind>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
            && matches!(
                self.status,
                SessionStatus::Authenticated | SessionStatus::Refreshing
            )
    }

    fn reset(&mut self) {
        self.status = SessionStatus::Unauthenticated;
        self.user = None;
        self.credentials = None;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_authenticated: self.is_authenticated(),
            is_loading: self.is_loading,
            status: self.status,
            user: self.user.clone(),
            expires_at: self.credentials.as_ref().map(|c| c.expires_at),
            last_error: self.last_error,
        }
    }
}

/// Token-free view of the session for presentation code.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub status: SessionStatus,
    pub user: Option<UserIdentity>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
}

/// Outcome of checking a persisted bundle at start-up.
enum Restored {
    Valid(CredentialBundle, UserIdentity),
    /// The provider could not be reached; the bundle is kept unchecked.
    Unverified(CredentialBundle, UserIdentity, ErrorKind),
    Invalid,
}

/// Errors that mean the provider refused the session, as opposed to not answering.
fn rejects_session(err: &Error) -> bool {
    !matches!(
        err.kind(),
        ErrorKind::Transient
            | ErrorKind::RateLimited
            | ErrorKind::Throttled
            | ErrorKind::Cancelled
            | ErrorKind::Storage
    )
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    store: TokenStore,
    state: RwLock<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
    /// Held for the whole of any operation that may write tokens
    gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: TokenStore) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            provider,
            store,
            state: RwLock::new(SessionState::default()),
            snapshots,
            gate: Mutex::new(()),
        }
    }

    // ===== Observation =====

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    /// Receive a new snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.state.read().await.user.clone()
    }

    pub async fn current_credentials(&self) -> Option<CredentialBundle> {
        self.state.read().await.credentials.clone()
    }

    pub async fn clear_error(&self) {
        self.update(|s| s.last_error = None).await;
    }

    async fn update<F: FnOnce(&mut SessionState)>(&self, f: F) {
        let mut state = self.state.write().await;
        f(&mut state);
        self.snapshots.send_replace(state.snapshot());
    }

    fn try_gate(&self) -> Result<MutexGuard<'_, ()>> {
        self.gate.try_lock().map_err(|_| {
            debug!("Rejected concurrent authentication operation");
            Error::ConcurrentOperation
        })
    }

    // ===== Restore =====

    /// Restore a persisted session at process start. Never fails. The store is
    /// only cleared when the provider rejects the session; if it cannot be
    /// reached the stored bundle is kept and used as is.
    pub async fn restore(&self) -> SessionSnapshot {
        let _gate = self.gate.lock().await;
        self.update(|s| {
            s.status = SessionStatus::Restoring;
            s.is_loading = true;
        })
        .await;

        let restored = match self.store.load().await {
            Some(bundle) => self.validate_restored(bundle).await,
            None => {
                debug!("No stored session");
                Restored::Invalid
            }
        };

        match restored {
            Restored::Valid(credentials, user) => {
                info!(user = %user.id, "Session restored");
                self.update(|s| {
                    s.status = SessionStatus::Authenticated;
                    s.user = Some(user);
                    s.credentials = Some(credentials);
                    s.is_loading = false;
                    s.last_error = None;
                })
                .await;
            }
            Restored::Unverified(credentials, user, kind) => {
                info!(user = %user.id, ?kind, "Session restored without verification");
                self.update(|s| {
                    s.status = SessionStatus::Authenticated;
                    s.user = Some(user);
                    s.credentials = Some(credentials);
                    s.is_loading = false;
                    s.last_error = Some(kind);
                })
                .await;
            }
            Restored::Invalid => {
                self.clear_store_logged().await;
                self.update(|s| {
                    s.reset();
                    s.is_loading = false;
                })
                .await;
            }
        }
        self.snapshot().await
    }

    async fn validate_restored(&self, bundle: CredentialBundle) -> Restored {
        let checked = if bundle.needs_refresh() {
            debug!("Stored session is stale, refreshing");
            match self.provider.refresh(&bundle.refresh_token).await {
                Ok(fresh) => {
                    if let Err(e) = self.store.store(&fresh).await {
                        warn!(error = %e, "Failed to persist refreshed session");
                    }
                    Ok(fresh)
                }
                Err(e) => Err((bundle, e)),
            }
        } else {
            match self.provider.get_user(&bundle.access_token).await {
                Ok(()) => Ok(bundle),
                Err(e) => Err((bundle, e)),
            }
        };

        match checked {
            Ok(bundle) => match bundle.user() {
                Ok(user) => Restored::Valid(bundle, user),
                Err(e) => {
                    warn!(error = %e, "Stored identity token is unreadable");
                    Restored::Invalid
                }
            },
            Err((_, e)) if rejects_session(&e) => {
                info!(error = %e, "Stored session was rejected");
                Restored::Invalid
            }
            Err((bundle, e)) => match bundle.user() {
                Ok(user) => {
                    warn!(error = %e, "Could not verify stored session, keeping it");
                    Restored::Unverified(bundle, user, e.kind())
                }
                Err(e) => {
                    warn!(error = %e, "Stored identity token is unreadable");
                    Restored::Invalid
                }
            },
        }
    }

    // ===== Sign-up =====

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        let email = email.trim();
        self.check_input(validate_email(email).and_then(|_| validate_password(password)))
            .await?;
        let _gate = self.try_gate()?;
        self.run_loading(self.provider.sign_up(email, password)).await
    }

    pub async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<()> {
        let code = code.trim();
        self.check_input(validate_code(code)).await?;
        let _gate = self.try_gate()?;
        self.run_loading(self.provider.confirm_sign_up(email.trim(), code))
            .await
    }

    pub async fn resend_confirmation_code(&self, email: &str) -> Result<()> {
        self.check_input(validate_email(email)).await?;
        let _gate = self.try_gate()?;
        self.run_loading(self.provider.resend_confirmation_code(email.trim()))
            .await
    }

    /// Record a rejected input as the last error before any provider call.
    async fn check_input(&self, check: Result<()>) -> Result<()> {
        if let Err(ref e) = check {
            self.update(|s| s.last_error = Some(e.kind())).await;
        }
        check
    }

    /// Run a call that does not change authentication, tracking loading and errors.
    async fn run_loading<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        self.update(|s| {
            s.is_loading = true;
            s.last_error = None;
        })
        .await;
        let result = call.await;
        let last_error = result.as_ref().err().map(Error::kind);
        self.update(|s| {
            s.is_loading = false;
            s.last_error = last_error;
        })
        .await;
        result
    }

    // ===== Sign-in =====

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity> {
        let _gate = self.try_gate()?;
        let email = email.trim();

        self.update(|s| {
            s.status = SessionStatus::Authenticating;
            s.is_loading = true;
            s.last_error = None;
        })
        .await;

        let outcome = match self.provider.sign_in(email, password).await {
            Ok(SignInOutcome::Authenticated { credentials, user }) => Ok((credentials, user)),
            Ok(SignInOutcome::ChallengeRequired { challenge, .. }) => Err(Error::Permanent(
                format!("Sign-in requires an additional step: {}", challenge),
            )),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((credentials, user)) => {
                let persisted = self.store.store(&credentials).await;
                if let Err(ref e) = persisted {
                    warn!(error = %e, "Signed in but the session could not be saved");
                }
                info!(user = %user.id, "Signed in");
                self.update(|s| {
                    s.status = SessionStatus::Authenticated;
                    s.user = Some(user.clone());
                    s.credentials = Some(credentials);
                    s.is_loading = false;
                    s.last_error = persisted.err().map(|e| e.kind());
                })
                .await;
                Ok(user)
            }
            Err(e) => {
                info!(kind = ?e.kind(), "Sign-in failed");
                // The previous session is dropped, so drop its persisted copy too
                if self.state.read().await.credentials.is_some() {
                    self.clear_store_logged().await;
                }
                self.update(|s| {
                    s.reset();
                    s.is_loading = false;
                    s.last_error = Some(e.kind());
                })
                .await;
                Err(e)
            }
        }
    }

    // ===== Sign-out =====

    /// Sign out locally, and remotely when possible. Local state is cleared
    /// even if the remote call fails. Signing out twice is a no-op.
    pub async fn sign_out(&self) -> Result<()> {
        let _gate = self.gate.lock().await;

        let credentials = self.state.read().await.credentials.clone();
        if let Some(credentials) = credentials {
            if let Err(e) = self.provider.sign_out(&credentials.access_token).await {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }

        self.update(|s| {
            s.reset();
            s.is_loading = false;
            s.last_error = None;
        })
        .await;

        if let Err(e) = self.store.clear().await {
            self.update(|s| s.last_error = Some(e.kind())).await;
            return Err(e);
        }
        info!("Signed out");
        Ok(())
    }

    // ===== Refresh =====

    /// Refresh the current bundle unconditionally.
    pub async fn refresh(&self) -> Result<CredentialBundle> {
        let _gate = self.gate.lock().await;
        self.refresh_locked().await
    }

    /// Refresh after a rejected request. If another task replaced the bundle
    /// while we waited for the gate, return that one instead of refreshing
    /// again.
    pub async fn refresh_if_unchanged(&self, rejected_id_token: &str) -> Result<CredentialBundle> {
        let _gate = self.gate.lock().await;
        if let Some(current) = self.state.read().await.credentials.clone() {
            if current.id_token != rejected_id_token && !current.needs_refresh() {
                debug!("Credentials already refreshed by another task");
                return Ok(current);
            }
        }
        self.refresh_locked().await
    }

    /// Current credentials, refreshed first if they are inside the expiry buffer.
    pub async fn valid_credentials(&self) -> Result<CredentialBundle> {
        if let Some(current) = self.state.read().await.credentials.clone() {
            if !current.needs_refresh() {
                return Ok(current);
            }
        }

        let _gate = self.gate.lock().await;
        match self.state.read().await.credentials.clone() {
            Some(current) if !current.needs_refresh() => return Ok(current),
            Some(_) => {}
            None => return Err(Error::Authentication("Not signed in".to_string())),
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<CredentialBundle> {
        let current = self
            .state
            .read()
            .await
            .credentials
            .clone()
            .ok_or_else(|| Error::Authentication("Not signed in".to_string()))?;

        self.update(|s| {
            s.status = SessionStatus::Refreshing;
            s.is_loading = true;
        })
        .await;

        let refreshed = self
            .provider
            .refresh(&current.refresh_token)
            .await
            .and_then(|fresh| fresh.user().map(|user| (fresh, user)));

        match refreshed {
            Ok((fresh, user)) => {
                let persisted = self.store.store(&fresh).await;
                if let Err(ref e) = persisted {
                    warn!(error = %e, "Refreshed session could not be saved");
                }
                debug!(expires_at = %fresh.expires_at, "Credentials refreshed");
                self.update(|s| {
                    s.status = SessionStatus::Authenticated;
                    s.user = Some(user);
                    s.credentials = Some(fresh.clone());
                    s.is_loading = false;
                    s.last_error = persisted.err().map(|e| e.kind());
                })
                .await;
                Ok(fresh)
            }
            Err(Error::SessionExpired) => {
                info!("Refresh token rejected, session ended");
                self.clear_store_logged().await;
                self.update(|s| {
                    s.reset();
                    s.is_loading = false;
                    s.last_error = Some(ErrorKind::SessionExpired);
                })
                .await;
                Err(Error::SessionExpired)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, keeping current session");
                self.update(|s| {
                    s.status = SessionStatus::Authenticated;
                    s.is_loading = false;
                    s.last_error = Some(e.kind());
                })
                .await;
                Err(e)
            }
        }
    }

    async fn clear_store_logged(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear stored credentials");
        }
    }

    // ===== Passwords =====

    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        self.check_input(validate_email(email)).await?;
        self.run_loading(self.provider.forgot_password(email.trim()))
            .await
    }

    pub async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        self.check_input(validate_code(code.trim()).and_then(|_| validate_password(new_password)))
            .await?;
        self.run_loading(
            self.provider
                .confirm_forgot_password(email.trim(), code.trim(), new_password),
        )
        .await
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.check_input(validate_password(new_password)).await?;
        let credentials = self.valid_credentials().await?;
        self.run_loading(self.provider.change_password(
            &credentials.access_token,
            old_password,
            new_password,
        ))
        .await
    }
}
