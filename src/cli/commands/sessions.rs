//! Sessions command - inspect or wipe stored credentials

use crate::cli::args::{OutputFormat, SessionsAction, SessionsArgs};
use crate::config::{Config, ConfigManager};
use crate::credentials::{CredentialStore, FsCredentialStore, StoredSession};
use crate::error::SessiondResult;
use crate::tenant::TenantId;
use crate::ui::{self, UiContext};
use console::style;
use std::path::Path;

/// Execute the sessions command
pub async fn execute(args: SessionsArgs, config: &Config) -> SessiondResult<()> {
    let root = args
        .session_root
        .clone()
        .unwrap_or_else(|| ConfigManager::session_root(config));

    match args.action {
        SessionsAction::List { format } => list(&root, format).await,
        SessionsAction::Wipe { tenant, yes } => wipe(&root, &tenant, yes).await,
    }
}

async fn list(root: &Path, format: OutputFormat) -> SessiondResult<()> {
    let sessions = FsCredentialStore::list(root).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
        OutputFormat::Plain => {
            for session in &sessions {
                println!("{}\t{}", session.tenant, session.entries);
            }
        }
        OutputFormat::Table => print_table(root, &sessions),
    }

    Ok(())
}

fn print_table(root: &Path, sessions: &[StoredSession]) {
    if sessions.is_empty() {
        println!("No stored sessions in {}", root.display());
        return;
    }

    println!(
        "{:<24} {:>8}  {}",
        style("TENANT").bold(),
        style("ENTRIES").bold(),
        style("MODIFIED").bold()
    );
    for session in sessions {
        let modified = session
            .modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<24} {:>8}  {}", session.tenant, session.entries, modified);
    }
}

async fn wipe(root: &Path, tenant: &str, yes: bool) -> SessiondResult<()> {
    let tenant = TenantId::parse(tenant)?;
    let ctx = UiContext::detect().with_auto_yes(yes);
    let store = FsCredentialStore::new(root, &tenant);

    if !store.exists().await {
        ui::step_info(&ctx, &format!("No stored credentials for {}", tenant));
        return Ok(());
    }

    let prompt = format!("Wipe stored credentials for {}?", tenant);
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::remark(&ctx, "Cancelled");
        return Ok(());
    }

    store.wipe().await?;
    ui::step_ok_detail(
        &ctx,
        &format!("Wiped credentials for {}", tenant),
        "A running server will need a new QR pairing",
    );
    Ok(())
}
