//! File-based storage with secure permissions.
//!
//! Each key maps to its own file under the data directory. Writes go to a
//! sibling temp file first and are renamed into place, so a reader sees
//! either the old value or the new one.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::SecureStorage;
use crate::error::{Error, Result};

const FILE_EXTENSION: &str = "dat";

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Keys may contain `@` and `:`; only keep characters safe on every filesystem.
    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", file_name, FILE_EXTENSION))
    }

    /// Write `value` to a fresh file that is never readable by other users.
    fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // A leftover temp file keeps its old mode, so tighten it as well
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(value.as_bytes())?;
        file.sync_all()
    }

    fn io_error(path: &Path, action: &str, err: std::io::Error) -> Error {
        Error::Storage(format!("Failed to {} {}: {}", action, path.display(), err))
    }
}

#[async_trait]
impl SecureStorage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, "read", e)),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, "create", e))?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension(format!("{}.tmp", FILE_EXTENSION));
        Self::write_private(&tmp_path, value).map_err(|e| Self::io_error(&tmp_path, "write", e))?;

        std::fs::rename(&tmp_path, &path).map_err(|e| Self::io_error(&path, "replace", e))?;
        debug!(path = %path.display(), "Saved to file");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, "remove", e)),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}
