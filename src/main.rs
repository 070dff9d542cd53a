//! sessiond - multi-tenant messaging session supervisor
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use sessiond::cli::{Cli, Commands};
use sessiond::config::ConfigManager;
use sessiond::error::SessiondResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SessiondResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);
    sessiond::ui::init_theme();
    debug!(path = %config_manager.path().display(), "Configuration loaded");

    match cli.command {
        Commands::Serve(args) => sessiond::cli::commands::serve(args, &config).await,
        Commands::Status(args) => sessiond::cli::commands::status(args, &config).await,
        Commands::Sessions(args) => sessiond::cli::commands::sessions(args, &config).await,
        Commands::Config(args) => {
            sessiond::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// RUST_LOG wins; otherwise 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("sessiond=warn"),
        1 => EnvFilter::new("sessiond=info,tower_http=info"),
        _ => EnvFilter::new("sessiond=debug,tower_http=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
