//! Wiring of the core services for one CLI invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use manuel_core::api::ApiClient;
use manuel_core::auth::{CognitoIdentityProvider, SessionManager, TokenStore};
use manuel_core::config::Config;
use manuel_core::retry::{RequestExecutor, RetryPolicy};
use manuel_core::storage::storage_for;

use crate::output::Output;

pub struct App {
    pub config: Config,
    pub output: Output,
    session: Arc<SessionManager>,
    executor: Arc<RequestExecutor>,
}

impl App {
    /// Build storage, identity provider and session, then restore any
    /// persisted session.
    pub async fn new(config: Config, output: Output) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let storage = storage_for(config.platform, &data_dir);
        debug!(backend = storage.name(), "Token storage selected");

        let provider = CognitoIdentityProvider::from_config(&config)?;
        let session = Arc::new(SessionManager::new(
            Arc::new(provider),
            TokenStore::new(storage),
        ));

        let snapshot = session.restore().await;
        info!(authenticated = snapshot.is_authenticated, "Session restored");

        let executor = Arc::new(RequestExecutor::new(
            session.clone(),
            RetryPolicy::from_config(&config.retry),
        ));

        Ok(Self {
            config,
            output,
            session,
            executor,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// REST client for the backend. Ctrl-C cancels pending retry waits.
    pub fn api(&self) -> Result<ApiClient> {
        let api = ApiClient::new(&self.config, self.executor.clone())
            .context("Backend is not configured")?;

        let cancel = api.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        Ok(api)
    }

    /// Print the retry countdown to stderr while requests back off.
    pub fn watch_retries(&self) -> Option<JoinHandle<()>> {
        if self.output.is_json() {
            return None;
        }
        let mut rx = self.executor.subscribe_retry_state();
        Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                if state.is_retrying && state.next_retry_in_seconds > 0 {
                    eprintln!(
                        "Retrying in {}s (attempt {}/{})",
                        state.next_retry_in_seconds, state.attempt, state.max_attempts
                    );
                }
            }
        }))
    }
}
