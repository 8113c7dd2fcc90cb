//! OS keychain storage.

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::SecureStorage;
use crate::error::{Error, Result};

const SERVICE_NAME: &str = "manuel";

#[derive(Default)]
pub struct KeyringStorage;

impl KeyringStorage {
    pub fn new() -> Self {
        Self
    }

    fn entry(key: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, key)
            .map_err(|e| Error::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

#[async_trait]
impl SecureStorage for KeyringStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read from keychain: {}",
                e
            ))),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        Self::entry(key)?
            .set_password(value)
            .map_err(|e| Error::Storage(format!("Failed to store in keychain: {}", e)))?;
        debug!(key, "Saved to keychain");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) => {
                debug!(key, "Removed from keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to delete from keychain: {}",
                e
            ))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
