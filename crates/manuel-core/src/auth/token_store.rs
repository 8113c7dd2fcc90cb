use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use tracing::{debug, warn};

use super::CredentialBundle;
use crate::error::{Error, Result};
use crate::storage::SecureStorage;

/// Namespace prefix for every key this client writes
pub const KEY_PREFIX: &str = "@manuel:";

/// Key holding the credential bundle
pub const CREDENTIALS_KEY: &str = "@manuel:auth_tokens";

/// Persists the credential bundle in a [`SecureStorage`] backend.
///
/// Values are JSON-serialized and then base64 encoded. The encoding only
/// keeps the payload opaque to casual inspection; protection comes from the
/// backend.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn SecureStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    pub fn backend(&self) -> &str {
        self.storage.name()
    }

    pub async fn store(&self, bundle: &CredentialBundle) -> Result<()> {
        let encoded = encode_bundle(bundle)?;
        self.storage.set_item(CREDENTIALS_KEY, &encoded).await?;
        debug!(backend = self.storage.name(), "Credentials stored");
        Ok(())
    }

    /// Load the stored bundle. Missing, unreadable or corrupt entries all
    /// read as "no session".
    pub async fn load(&self) -> Option<CredentialBundle> {
        match self.storage.get_item(CREDENTIALS_KEY).await {
            Ok(Some(encoded)) => {
                let bundle = decode_bundle(&encoded);
                if bundle.is_none() {
                    warn!(backend = self.storage.name(), "Stored credentials are corrupt, ignoring");
                }
                bundle
            }
            Ok(None) => None,
            Err(e) => {
                warn!(backend = self.storage.name(), error = %e, "Failed to read stored credentials");
                None
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.remove_item(CREDENTIALS_KEY).await?;
        debug!(backend = self.storage.name(), "Credentials cleared");
        Ok(())
    }
}

fn encode_bundle(bundle: &CredentialBundle) -> Result<String> {
    let json = serde_json::to_vec(bundle)
        .map_err(|e| Error::Storage(format!("Failed to serialize credentials: {}", e)))?;
    Ok(URL_SAFE.encode(json))
}

fn decode_bundle(encoded: &str) -> Option<CredentialBundle> {
    let json = URL_SAFE.decode(encoded.trim()).ok()?;
    serde_json::from_slice(&json).ok()
}
