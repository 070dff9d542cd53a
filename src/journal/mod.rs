//! Durable side effects of session events
//!
//! Supervisors notify subscribers synchronously, so the journal subscriber
//! only enqueues. A single writer task drains the queue into the audit log
//! and the inbox.

pub mod audit;
pub mod inbox;

pub use audit::AuditLog;
pub use inbox::{Author, Inbox, InboxEntry};

use crate::session::{EventHandler, SessionEvent};
use crate::tenant::TenantId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to the journal writer; cheap to clone
#[derive(Clone)]
pub struct Journal {
    tx: mpsc::UnboundedSender<(TenantId, SessionEvent)>,
}

impl Journal {
    /// Start the writer task. It runs until every handle and handler is
    /// dropped.
    pub fn spawn(audit: AuditLog, inbox: Option<Arc<Inbox>>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx, audit, inbox));
        (Self { tx }, handle)
    }

    /// Subscriber that feeds this journal
    pub fn handler(&self) -> EventHandler {
        let tx = self.tx.clone();
        Arc::new(move |tenant: &TenantId, event: &SessionEvent| {
            if tx.send((tenant.clone(), event.clone())).is_err() {
                debug!(tenant = %tenant, "Journal writer is gone, dropping event");
            }
        })
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<(TenantId, SessionEvent)>,
    audit: AuditLog,
    inbox: Option<Arc<Inbox>>,
) {
    while let Some((tenant, event)) = rx.recv().await {
        record(&audit, inbox.as_deref(), &tenant, &event).await;
    }
    debug!("Journal writer stopped");
}

async fn record(audit: &AuditLog, inbox: Option<&Inbox>, tenant: &TenantId, event: &SessionEvent) {
    let data = match event {
        SessionEvent::MessageReceived(message) => {
            if let Some(inbox) = inbox {
                if let Err(e) = inbox.record(tenant, message).await {
                    warn!(tenant = %tenant, "Failed to record inbound message: {}", e);
                }
            }
            return;
        }
        SessionEvent::StateChanged(state) => serde_json::json!({ "state": state }),
        // The payload is a pairing secret
        SessionEvent::QrIssued(_) => serde_json::json!({}),
        SessionEvent::Connected { identity } => serde_json::json!({ "identity": identity }),
        SessionEvent::Disconnected(reason) => serde_json::json!(reason),
    };

    audit.log(event.name(), tenant, &data).await;
}
