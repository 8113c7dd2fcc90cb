//! Secure key/value persistence backends.
//!
//! Provides the [`SecureStorage`] trait and implementations:
//! - [`KeyringStorage`] - OS keychain via `keyring`
//! - [`FileStorage`] - one file per key, written atomically with 0600 permissions
//! - [`MemoryStorage`] - in-memory (tests, ephemeral sessions)
//!
//! The backend is picked once at startup by [`storage_for`] from the
//! configured [`TokenStorePlatform`].

mod file;
mod keyring;
mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use self::file::FileStorage;
pub use self::keyring::KeyringStorage;
pub use self::memory::MemoryStorage;

use crate::config::TokenStorePlatform;
use crate::error::Result;

/// A string-keyed secure value store.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key succeeds.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Name of this storage backend.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: SecureStorage + ?Sized> SecureStorage for Arc<T> {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key).await
    }
    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value).await
    }
    async fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Build the backend for a platform. `data_dir` is only used by the file backend.
pub fn storage_for(platform: TokenStorePlatform, data_dir: &Path) -> Arc<dyn SecureStorage> {
    match platform {
        TokenStorePlatform::Keyring => Arc::new(KeyringStorage::new()),
        TokenStorePlatform::File => Arc::new(FileStorage::new(data_dir)),
        TokenStorePlatform::Memory => Arc::new(MemoryStorage::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_backend() {
        let dir = std::env::temp_dir();
        assert_eq!(storage_for(TokenStorePlatform::Keyring, &dir).name(), "keyring");
        assert_eq!(storage_for(TokenStorePlatform::File, &dir).name(), "file");
        assert_eq!(storage_for(TokenStorePlatform::Memory, &dir).name(), "memory");
    }
}
