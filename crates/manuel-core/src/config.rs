//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend URL, the identity pool client, which token store backend to use,
//! and the retry policy inputs.
//!
//! Configuration is stored at `~/.config/manuel/config.json`. Selected
//! fields can be overridden from the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "manuel";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_REGION: &str = "us-east-1";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "MANUEL_API_URL";
pub const ENV_REGION: &str = "MANUEL_REGION";
pub const ENV_CLIENT_ID: &str = "MANUEL_CLIENT_ID";
pub const ENV_IDENTITY_ENDPOINT: &str = "MANUEL_IDENTITY_ENDPOINT";
pub const ENV_TOKEN_STORE: &str = "MANUEL_TOKEN_STORE";

/// Which secure persistence backend holds the credential bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorePlatform {
    /// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service)
    #[default]
    Keyring,
    /// Encoded file in the data directory, for headless machines
    File,
    /// Process memory only; nothing survives exit
    Memory,
}

impl fmt::Display for TokenStorePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenStorePlatform::Keyring => "keyring",
            TokenStorePlatform::File => "file",
            TokenStorePlatform::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl FromStr for TokenStorePlatform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" | "keychain" => Ok(TokenStorePlatform::Keyring),
            "file" => Ok(TokenStorePlatform::File),
            "memory" => Ok(TokenStorePlatform::Memory),
            other => Err(Error::Config(format!("unknown token store '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::Config(format!("unknown output format '{}'", other))),
        }
    }
}

/// Inputs to the retry policy. None of these are baked into the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub rate_limit_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_retries: 3,
            rate_limit_max_retries: 2,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub region: String,
    pub user_pool_client_id: Option<String>,
    /// Overrides the regional Cognito endpoint (local testing, proxies)
    pub identity_endpoint: Option<String>,
    pub platform: TokenStorePlatform,
    pub retry: RetryConfig,
    pub request_timeout_secs: u64,
    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            region: DEFAULT_REGION.to_string(),
            user_pool_client_id: None,
            identity_endpoint: None,
            platform: TokenStorePlatform::default(),
            retry: RetryConfig::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            output: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("create {}: {}", parent.display(), e)))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("write {}: {}", path.display(), e)))
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(region) = lookup(ENV_REGION) {
            self.region = region;
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.user_pool_client_id = Some(client_id);
        }
        if let Some(endpoint) = lookup(ENV_IDENTITY_ENDPOINT) {
            self.identity_endpoint = Some(endpoint);
        }
        if let Some(platform) = lookup(ENV_TOKEN_STORE) {
            self.platform = platform.parse()?;
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file token store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| Error::Config("Could not find data directory".to_string()))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn api_base_url(&self) -> Result<&str> {
        self.api_base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("API URL not set (config api_base_url or {})", ENV_API_URL))
            })
    }

    pub fn client_id(&self) -> Result<&str> {
        self.user_pool_client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "User pool client id not set (config user_pool_client_id or {})",
                    ENV_CLIENT_ID
                ))
            })
    }

    /// Cognito endpoint, either the override or the regional default.
    pub fn identity_endpoint(&self) -> String {
        match self.identity_endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => format!("https://cognito-idp.{}.amazonaws.com", self.region),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that everything an authenticated operation needs is present.
    pub fn validate(&self) -> Result<()> {
        self.api_base_url()?;
        self.client_id()?;
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "api_base_url" => self.api_base_url.clone().unwrap_or_default(),
            "region" => self.region.clone(),
            "user_pool_client_id" => self.user_pool_client_id.clone().unwrap_or_default(),
            "identity_endpoint" => self.identity_endpoint.clone().unwrap_or_default(),
            "platform" => self.platform.to_string(),
            "request_timeout_secs" => self.request_timeout_secs.to_string(),
            "output" => match self.output {
                OutputFormat::Human => "human".to_string(),
                OutputFormat::Json => "json".to_string(),
            },
            "retry.base_delay_ms" => self.retry.base_delay_ms.to_string(),
            "retry.max_delay_ms" => self.retry.max_delay_ms.to_string(),
            "retry.max_retries" => self.retry.max_retries.to_string(),
            "retry.rate_limit_max_retries" => self.retry.rate_limit_max_retries.to_string(),
            other => return Err(Error::Config(format!("unknown key '{}'", other))),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn optional(value: &str) -> Option<String> {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        fn number<T: FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("'{}' expects a number, got '{}'", key, value)))
        }

        match key {
            "api_base_url" => self.api_base_url = optional(value),
            "region" => self.region = value.trim().to_string(),
            "user_pool_client_id" => self.user_pool_client_id = optional(value),
            "identity_endpoint" => self.identity_endpoint = optional(value),
            "platform" => self.platform = value.parse()?,
            "request_timeout_secs" => self.request_timeout_secs = number(key, value)?,
            "output" => self.output = value.parse()?,
            "retry.base_delay_ms" => self.retry.base_delay_ms = number(key, value)?,
            "retry.max_delay_ms" => self.retry.max_delay_ms = number(key, value)?,
            "retry.max_retries" => self.retry.max_retries = number(key, value)?,
            "retry.rate_limit_max_retries" => {
                self.retry.rate_limit_max_retries = number(key, value)?
            }
            other => return Err(Error::Config(format!("unknown key '{}'", other))),
        }
        Ok(())
    }
}
