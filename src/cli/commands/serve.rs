//! Serve command - run the HTTP session server

use crate::cli::args::ServeArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{SessiondError, SessiondResult};
use crate::http::{build_router, AppState};
use crate::journal::{AuditLog, Inbox, Journal};
use crate::session::SessionRegistry;
use crate::transport::create_transport;
use crate::ui::{self, UiContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long to wait for pending journal writes at exit
const JOURNAL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> SessiondResult<()> {
    let config = apply_overrides(args, config);
    let ctx = if config.general.log_format == "json" {
        UiContext::detect().plain()
    } else {
        UiContext::detect()
    };

    ConfigManager::ensure_state_dirs(&config).await?;
    let transport = create_transport(&config.transport)?;

    let inbox = config.inbox.enabled.then(|| Arc::new(Inbox::new(&config)));
    let (journal, journal_writer) = Journal::spawn(AuditLog::new(&config), inbox.clone());

    let registry = Arc::new(
        SessionRegistry::from_config(&config, Arc::clone(&transport)).with_journal(journal),
    );

    let mut state = AppState::new(Arc::clone(&registry));
    if let Some(inbox) = inbox {
        state = state.with_inbox(inbox);
    }
    let app = build_router(state, &config.server.cors_origins);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| SessiondError::io(format!("binding {}", config.server.bind), e))?;
    let address = listener
        .local_addr()
        .map_err(|e| SessiondError::io("reading listener address", e))?;

    info!(
        address = %address,
        transport = transport.name(),
        session_root = %registry.session_root().display(),
        "Server listening"
    );
    ui::step_ok_detail(&ctx, "sessiond listening", &format!("http://{}", address));
    ui::key_value(&ctx, "Sessions", &registry.session_root().display().to_string());
    ui::key_value(&ctx, "Transport", transport.name());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SessiondError::io("serving HTTP", e))?;

    registry.shutdown().await;
    ui::step_ok(&ctx, "Sessions closed");
    drop(registry);

    if tokio::time::timeout(JOURNAL_DRAIN_TIMEOUT, journal_writer)
        .await
        .is_err()
    {
        warn!("Journal writer did not finish in time");
    }

    ui::outro_success(&ctx, "Server stopped");
    Ok(())
}

fn apply_overrides(args: ServeArgs, config: &Config) -> Config {
    let mut config = config.clone();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(root) = args.session_root {
        config.sessions.root = Some(root);
    }
    config
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown requested");
}
