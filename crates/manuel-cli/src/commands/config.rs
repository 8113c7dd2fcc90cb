use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;

use manuel_core::config::Config;

use crate::cli::ConfigCommand;
use crate::output::Output;

/// Every key accepted by `config get` and `config set`.
pub const KEYS: &[&str] = &[
    "api_base_url",
    "region",
    "user_pool_client_id",
    "identity_endpoint",
    "platform",
    "request_timeout_secs",
    "output",
    "retry.base_delay_ms",
    "retry.max_delay_ms",
    "retry.max_retries",
    "retry.rate_limit_max_retries",
];

/// Reads and writes the file only; environment overrides are never saved.
pub fn run(command: ConfigCommand, out: Output) -> Result<()> {
    let path = Config::config_path()?;

    match command {
        ConfigCommand::Show => {
            let mut config = Config::load_from(&path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            let values = KEYS
                .iter()
                .map(|key| Ok((*key, config.get(key)?)))
                .collect::<manuel_core::Result<BTreeMap<_, _>>>()?;
            out.emit(&values, |values| {
                for (key, value) in values {
                    println!("{} = {}", key, value);
                }
            })?;
        }
        ConfigCommand::Get { key } => {
            let config = Config::load_from(&path)?;
            let value = config.get(&key)?;
            out.emit(&json!({ "key": key, "value": value }), |_| println!("{}", value))?;
        }
        ConfigCommand::Set { key, value } => {
            let mut config = Config::load_from(&path)?;
            config.set(&key, &value)?;
            config.save_to(&path)?;
            out.success(&format!("{} = {}", key, config.get(&key)?));
        }
        ConfigCommand::Path => {
            out.emit(&json!({ "path": path }), |_| println!("{}", path.display()))?;
        }
        ConfigCommand::Reset => {
            Config::default().save_to(&path)?;
            out.success(&format!("Configuration reset ({})", path.display()));
        }
    }
    Ok(())
}
