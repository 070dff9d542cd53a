//! Messaging transport abstraction
//!
//! The wire protocol lives behind two traits: a [`Transport`] opens one
//! authenticated connection per tenant, and the resulting [`SessionClient`]
//! sends, deauthorizes and closes it. Everything the network tells us
//! arrives as [`ClientEvent`]s on the connection's event channel.

mod loopback;

pub use loopback::LoopbackTransport;

use crate::address::Address;
use crate::config::schema::TransportConfig;
use crate::credentials::Credentials;
use crate::error::{SessiondError, SessiondResult};
use crate::tenant::TenantId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of a connection's event channel
pub const EVENT_BUFFER: usize = 64;

/// Why a connection closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The device was unlinked; stored credentials are no longer valid
    LoggedOut,
    /// Anything else (network drop, server restart, stream error)
    Other(String),
}

/// A message delivered to the tenant's account
#[derive(Debug, Clone, Serialize)]
pub struct InboundMessage {
    pub id: String,
    /// Conversation the message belongs to
    pub remote: Address,
    /// Sent by the tenant's own account from another device
    pub from_me: bool,
    pub text: Option<String>,
    pub has_media: bool,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn is_group(&self) -> bool {
        self.remote.is_group()
    }

    /// Printable content, with a placeholder for non-text messages
    pub fn content(&self) -> Option<&str> {
        match (&self.text, self.has_media) {
            (Some(text), _) => Some(text),
            (None, true) => Some("[media]"),
            (None, false) => None,
        }
    }
}

/// Events emitted by a live connection
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Credential material changed and must be persisted
    CredentialsUpdated(Credentials),
    /// A pairing code is ready to be scanned
    QrIssued(String),
    /// The session is authenticated and usable
    Opened { identity: Option<String> },
    /// The connection is gone
    Closed(DisconnectReason),
    MessageReceived(InboundMessage),
}

/// Result of a successful send
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
    pub to: Address,
}

/// An open connection: the client handle plus its event stream
pub struct Connection {
    pub client: Arc<dyn SessionClient>,
    pub events: mpsc::Receiver<ClientEvent>,
}

/// One authenticated connection to the messaging network
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Send a text message
    async fn send_text(&self, to: &Address, body: &str) -> SessiondResult<SendReceipt>;

    /// Deauthorize this device on the network
    async fn logout(&self) -> SessiondResult<()>;

    /// Drop the connection without deauthorizing
    async fn close(&self);
}

/// Opens connections to the messaging network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection for a tenant, resuming from stored credentials
    /// when there are any
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Credentials,
    ) -> SessiondResult<Connection>;

    /// Human-readable transport name for logs
    fn name(&self) -> &'static str;
}

/// Create the transport selected in the configuration
pub fn create_transport(config: &TransportConfig) -> SessiondResult<Arc<dyn Transport>> {
    match config.kind.as_str() {
        "loopback" => {
            let auto_pair =
                (config.auto_pair_secs > 0).then(|| Duration::from_secs(config.auto_pair_secs));
            Ok(Arc::new(LoopbackTransport::new(auto_pair)))
        }
        other => Err(SessiondError::UnsupportedTransport(other.to_string())),
    }
}
