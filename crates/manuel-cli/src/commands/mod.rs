//! Subcommand handlers.

pub mod auth;
pub mod config;
pub mod manuals;
pub mod query;
pub mod usage;

use anyhow::Result;

use manuel_core::config::Config;

use crate::app::App;
use crate::cli::Command;
use crate::output::Output;

/// Run a command that talks to the identity provider or the backend.
/// `config` commands are handled before this point and never build an `App`.
pub async fn run(command: Command, config: Config, output: Output) -> Result<()> {
    let app = App::new(config, output).await?;
    match command {
        Command::Auth(command) => auth::run(&app, command).await,
        Command::Query(command) => query::run(&app, command).await,
        Command::Manuals(command) => manuals::run(&app, command).await,
        Command::Usage(command) => usage::run(&app, command).await,
        Command::Config(command) => config::run(command, output),
    }
}
