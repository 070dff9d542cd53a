//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sessiond - multi-tenant messaging session supervisor
///
/// Keeps one supervised, auto-reconnecting messaging session per tenant and
/// exposes QR pairing, status, send and logout over HTTP.
#[derive(Parser, Debug)]
#[command(name = "sessiond")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SESSIOND_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP session server
    Serve(ServeArgs),

    /// Show a tenant's session on a running server
    Status(StatusArgs),

    /// Inspect or wipe stored session credentials
    Sessions(SessionsArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind)
    #[arg(short, long, env = "SESSIOND_BIND")]
    pub bind: Option<String>,

    /// Root directory for per-tenant credentials (overrides sessions.root)
    #[arg(long, env = "SESSIOND_SESSION_ROOT")]
    pub session_root: Option<PathBuf>,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Tenant identifier
    pub tenant: String,

    /// Server base URL (defaults to http://<server.bind>)
    #[arg(short, long, env = "SESSIOND_SERVER")]
    pub server: Option<String>,

    /// Start the session first
    #[arg(long)]
    pub start: bool,

    /// Keep polling until the session is connected or logged out
    #[arg(short, long)]
    pub wait: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the sessions command
#[derive(Parser, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub action: SessionsAction,

    /// Root directory for per-tenant credentials (overrides sessions.root)
    #[arg(long, global = true, env = "SESSIOND_SESSION_ROOT")]
    pub session_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum SessionsAction {
    /// List tenants with stored credentials
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete a tenant's stored credentials (forces a new QR pairing)
    Wipe {
        /// Tenant identifier
        tenant: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format options
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Plain,
}
