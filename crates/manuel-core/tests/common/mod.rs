//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;

use manuel_core::auth::{
    CredentialBundle, IdentityProvider, SessionManager, SignInOutcome, SignUpResult, TokenStore,
    UserIdentity,
};
use manuel_core::storage::{MemoryStorage, SecureStorage};
use manuel_core::{Error, Result};

pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "Correct-Horse-9";
pub const SUBJECT: &str = "3f1c2b9e-0000-4000-8000-000000000001";

pub fn fake_jwt(sub: &str, email: &str, nonce: usize) -> String {
    let claims = format!(
        r#"{{"sub":"{}","email":"{}","email_verified":true,"iat":1700000000,"nonce":{}}}"#,
        sub, email, nonce
    );
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims)
    )
}

/// Negative lifetimes give an already expired bundle.
pub fn bundle(nonce: usize, expires_in_secs: i64) -> CredentialBundle {
    CredentialBundle::new(
        format!("access-{}", nonce),
        "refresh-token".to_string(),
        fake_jwt(SUBJECT, EMAIL, nonce),
        Utc::now() + chrono::Duration::seconds(expires_in_secs),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    Succeed,
    Expired,
    Transient,
}

/// In-process identity provider with call counters.
pub struct FakeIdentityProvider {
    pub sign_in_calls: AtomicUsize,
    pub sign_up_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub get_user_calls: AtomicUsize,
    pub change_password_calls: AtomicUsize,
    pub resend_calls: AtomicUsize,
    pub password_reset_calls: AtomicUsize,
    pub sign_out_fails: AtomicBool,
    pub get_user_fails: AtomicBool,
    /// GetUser and refresh fail as if the provider were offline
    pub unreachable: AtomicBool,
    pub unconfirmed: AtomicBool,
    pub challenge: Mutex<Option<String>>,
    pub refresh_behavior: Mutex<RefreshBehavior>,
    pub sign_in_delay: Mutex<Duration>,
    pub existing_accounts: Mutex<Vec<String>>,
    /// Lifetime of bundles issued by sign-in
    pub sign_in_ttl_secs: Mutex<i64>,
    issued: AtomicUsize,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        Self {
            sign_in_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            get_user_calls: AtomicUsize::new(0),
            change_password_calls: AtomicUsize::new(0),
            resend_calls: AtomicUsize::new(0),
            password_reset_calls: AtomicUsize::new(0),
            sign_out_fails: AtomicBool::new(false),
            get_user_fails: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            unconfirmed: AtomicBool::new(false),
            challenge: Mutex::new(None),
            refresh_behavior: Mutex::new(RefreshBehavior::Succeed),
            sign_in_delay: Mutex::new(Duration::ZERO),
            existing_accounts: Mutex::new(Vec::new()),
            sign_in_ttl_secs: Mutex::new(3600),
            issued: AtomicUsize::new(100),
        }
    }
}

impl FakeIdentityProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_refresh(&self, behavior: RefreshBehavior) {
        *self.refresh_behavior.lock().unwrap() = behavior;
    }

    pub fn set_sign_in_delay(&self, delay: Duration) {
        *self.sign_in_delay.lock().unwrap() = delay;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn issue(&self, expires_in_secs: i64) -> CredentialBundle {
        let nonce = self.issued.fetch_add(1, Ordering::SeqCst);
        bundle(nonce, expires_in_secs)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpResult> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.existing_accounts.lock().unwrap().iter().any(|e| e == email) {
            return Err(Error::Conflict("User already exists".into()));
        }
        Ok(SignUpResult {
            subject: SUBJECT.to_string(),
            needs_confirmation: true,
        })
    }

    async fn confirm_sign_up(&self, _email: &str, code: &str) -> Result<()> {
        if code == "123456" {
            Ok(())
        } else {
            Err(Error::InvalidCode("Invalid verification code provided".into()))
        }
    }

    async fn resend_confirmation_code(&self, _email: &str) -> Result<()> {
        self.resend_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.sign_in_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if email != EMAIL || password != PASSWORD {
            return Err(Error::InvalidCredentials("Incorrect username or password.".into()));
        }
        if self.unconfirmed.load(Ordering::SeqCst) {
            return Err(Error::NotConfirmed("User is not confirmed.".into()));
        }
        if let Some(challenge) = self.challenge.lock().unwrap().clone() {
            return Ok(SignInOutcome::ChallengeRequired {
                challenge,
                session: Some("challenge-session".into()),
            });
        }
        let ttl = *self.sign_in_ttl_secs.lock().unwrap();
        let credentials = self.issue(ttl);
        let user = credentials.user()?;
        Ok(SignInOutcome::Authenticated { credentials, user })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<CredentialBundle> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Transient("Identity provider returned 503".into()));
        }
        let behavior = *self.refresh_behavior.lock().unwrap();
        match behavior {
            RefreshBehavior::Succeed => Ok(self.issue(3600)),
            RefreshBehavior::Expired => Err(Error::SessionExpired),
            RefreshBehavior::Transient => Err(Error::Transient("connection reset".into())),
        }
    }

    async fn get_user(&self, _access_token: &str) -> Result<()> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Transient("Identity provider returned 503".into()));
        }
        if self.get_user_fails.load(Ordering::SeqCst) {
            Err(Error::SessionExpired)
        } else {
            Ok(())
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.sign_out_fails.load(Ordering::SeqCst) {
            Err(Error::Transient("network unreachable".into()))
        } else {
            Ok(())
        }
    }

    async fn forgot_password(&self, _email: &str) -> Result<()> {
        self.password_reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn confirm_forgot_password(&self, _email: &str, code: &str, _new: &str) -> Result<()> {
        self.password_reset_calls.fetch_add(1, Ordering::SeqCst);
        if code == "123456" {
            Ok(())
        } else {
            Err(Error::InvalidCode("Invalid verification code provided".into()))
        }
    }

    async fn change_password(&self, _access_token: &str, old: &str, _new: &str) -> Result<()> {
        self.change_password_calls.fetch_add(1, Ordering::SeqCst);
        if old == PASSWORD {
            Ok(())
        } else {
            Err(Error::InvalidCredentials("Incorrect username or password.".into()))
        }
    }
}

/// Storage whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
}

#[async_trait]
impl SecureStorage for FlakyStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("read-only filesystem".into()));
        }
        self.inner.remove_item(key).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

pub struct Harness {
    pub provider: Arc<FakeIdentityProvider>,
    pub storage: Arc<FlakyStorage>,
    pub store: TokenStore,
    pub session: Arc<SessionManager>,
}

pub fn harness() -> Harness {
    let provider = FakeIdentityProvider::new();
    let storage = Arc::new(FlakyStorage::default());
    let store = TokenStore::new(storage.clone());
    let session = Arc::new(SessionManager::new(provider.clone(), store.clone()));
    Harness {
        provider,
        storage,
        store,
        session,
    }
}

pub async fn signed_in_harness() -> Harness {
    let h = harness();
    h.session
        .sign_in(EMAIL, PASSWORD)
        .await
        .expect("sign-in with valid credentials");
    h
}

pub fn user_of(bundle: &CredentialBundle) -> UserIdentity {
    bundle.user().expect("fake token decodes")
}
