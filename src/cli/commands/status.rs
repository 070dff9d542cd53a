//! Status command - show a tenant's session on a running server

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::client::ApiClient;
use crate::config::Config;
use crate::error::{SessiondError, SessiondResult};
use crate::session::{SessionSnapshot, SessionState};
use crate::tenant::TenantId;
use crate::ui::{self, StateSpinner, UiContext};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> SessiondResult<()> {
    let tenant = TenantId::parse(&args.tenant)?;
    let base = args
        .server
        .clone()
        .unwrap_or_else(|| format!("http://{}", config.server.bind));
    let client = ApiClient::new(base);

    let mut snapshot = if args.start {
        call(&client, &tenant, ApiClient::start).await?
    } else {
        call(&client, &tenant, ApiClient::status).await?
    };

    if args.wait && !ui::is_settled(snapshot.state) {
        snapshot = wait_until_settled(&client, &tenant, snapshot, &args).await?;
    }

    match args.format {
        OutputFormat::Table => print_table(&snapshot),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Plain => println!("{}\t{}", snapshot.tenant_id, snapshot.state.as_str()),
    }

    Ok(())
}

/// Run a blocking client call on the blocking pool
async fn call(
    client: &ApiClient,
    tenant: &TenantId,
    request: fn(&ApiClient, &TenantId) -> SessiondResult<SessionSnapshot>,
) -> SessiondResult<SessionSnapshot> {
    let client = client.clone();
    let tenant = tenant.clone();
    tokio::task::spawn_blocking(move || request(&client, &tenant))
        .await
        .map_err(|e| SessiondError::Internal(format!("request task failed: {}", e)))?
}

async fn wait_until_settled(
    client: &ApiClient,
    tenant: &TenantId,
    mut snapshot: SessionSnapshot,
    args: &StatusArgs,
) -> SessiondResult<SessionSnapshot> {
    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let ctx = UiContext::detect();
    let mut spinner = matches!(args.format, OutputFormat::Table).then(|| StateSpinner::new(&ctx));

    loop {
        if let Some(spinner) = spinner.as_mut() {
            spinner.update(&snapshot);
        }
        if ui::is_settled(snapshot.state) {
            if let Some(spinner) = spinner.as_mut() {
                spinner.stop(snapshot.state.as_str());
            }
            return Ok(snapshot);
        }
        if Instant::now() >= deadline {
            if let Some(spinner) = spinner.as_mut() {
                spinner.stop_error("Gave up waiting");
            }
            return Err(SessiondError::Timeout {
                operation: "wait",
                tenant: tenant.to_string(),
                secs: args.timeout,
            });
        }

        tokio::time::sleep(POLL_INTERVAL).await;
        snapshot = call(client, tenant, ApiClient::status).await?;
    }
}

fn print_table(snapshot: &SessionSnapshot) {
    let ctx = UiContext::detect();

    ui::intro(&ctx, &format!("Session {}", snapshot.tenant_id));
    ui::key_value_state(&ctx, "State", snapshot.state);
    if let Some(identity) = &snapshot.connected_identity {
        ui::key_value(&ctx, "Identity", identity);
    }
    if let Some(qr) = &snapshot.last_qr_payload {
        ui::note(&ctx, "Scan with the messaging app", qr);
    }

    match snapshot.state {
        SessionState::Disconnected => {
            ui::remark(&ctx, "Reconnect is scheduled, or run with --start")
        }
        SessionState::LoggedOut => ui::remark(&ctx, "Run with --start to pair again"),
        _ => {}
    }
}
