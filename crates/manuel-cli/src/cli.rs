//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "manuel", author, version, about, long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Account and session management
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Ask questions about your manuals
    #[command(subcommand)]
    Query(QueryCommand),

    /// Upload, list, download and delete manuals
    #[command(subcommand)]
    Manuals(ManualsCommand),

    /// Usage statistics and costs
    #[command(subcommand)]
    Usage(UsageCommand),

    /// Show or change configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Password supplied on the command line or through the environment.
/// Prompted for without echo when absent.
#[derive(Args, Debug, Clone)]
pub struct PasswordArg {
    #[arg(long, env = "MANUEL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Create an account
    Signup {
        email: String,
        #[command(flatten)]
        password: PasswordArg,
    },
    /// Confirm an account with the emailed code
    Confirm { email: String, code: String },
    /// Send a new confirmation code
    ResendCode { email: String },
    /// Sign in
    Login {
        email: String,
        #[command(flatten)]
        password: PasswordArg,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show the current session
    Status,
    /// Email a password reset code
    ForgotPassword { email: String },
    /// Set a new password with a reset code
    ResetPassword {
        email: String,
        code: String,
        #[command(flatten)]
        password: PasswordArg,
    },
    /// Change the password of the signed-in account
    ChangePassword,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// Ask a text question
    Ask {
        question: String,
        /// Restrict the answer to one manual
        #[arg(short, long)]
        manual: Option<String>,
    },
    /// Ask with a recorded audio file
    Voice {
        file: PathBuf,
        #[arg(short, long)]
        manual: Option<String>,
        /// MIME type of the recording (guessed from the extension if omitted)
        #[arg(long)]
        content_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ManualsCommand {
    /// List uploaded manuals
    List,
    /// Upload a manual (PDF)
    Upload {
        file: PathBuf,
        /// Name to store the manual under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Download a manual
    Download {
        id: String,
        /// Destination file (defaults to <id>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a manual
    Delete { id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormatArg {
    Csv,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum UsageCommand {
    /// Totals for the current period
    Stats,
    /// Recent queries
    History {
        #[arg(short, long, default_value_t = manuel_core::api::DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },
    /// Cost breakdown by service
    Costs,
    /// Plan limits
    Quotas,
    /// Export usage data
    Export {
        #[arg(short, long, value_enum, default_value_t = ExportFormatArg::Csv)]
        format: ExportFormatArg,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print one value
    Get { key: String },
    /// Set one value and save
    Set { key: String, value: String },
    /// Print the configuration file location
    Path,
    /// Restore defaults
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["manuel", "usage", "history", "--limit", "5", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Usage(UsageCommand::History { limit }) => assert_eq!(limit, 5),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_login_with_password_flag() {
        let cli = Cli::try_parse_from([
            "manuel", "auth", "login", "user@example.com", "--password", "secret",
        ])
        .unwrap();
        match cli.command {
            Command::Auth(AuthCommand::Login { email, password }) => {
                assert_eq!(email, "user@example.com");
                assert_eq!(password.password.as_deref(), Some("secret"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
