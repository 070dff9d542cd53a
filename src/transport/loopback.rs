//! In-process simulated messaging network
//!
//! Behaves like a real network from the supervisor's point of view: a
//! tenant without credentials gets a QR code, pairing hands out credential
//! material and opens the session, stored credentials reconnect straight to
//! an open session. Every tenant's link can also be driven by hand, which is
//! what the tests use to inject disconnects and inbound messages.

use super::{
    ClientEvent, Connection, DisconnectReason, InboundMessage, SendReceipt, SessionClient,
    Transport, EVENT_BUFFER,
};
use crate::address::Address;
use crate::credentials::Credentials;
use crate::error::{SessiondError, SessiondResult};
use crate::tenant::TenantId;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Per-tenant state of the simulated network
#[derive(Default)]
struct Link {
    /// Sender of the most recent connection
    current: Option<(u64, mpsc::Sender<ClientEvent>)>,
    next_conn_id: u64,
    connects: usize,
    open: usize,
    /// Connection that completed authentication
    paired: Option<u64>,
    fail_next_connect: Option<String>,
    refuse_logout: bool,
    sent: Vec<(Address, String)>,
}

type Links = Arc<Mutex<HashMap<TenantId, Link>>>;

fn lock(links: &Links) -> MutexGuard<'_, HashMap<TenantId, Link>> {
    links.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated transport
pub struct LoopbackTransport {
    auto_pair: Option<Duration>,
    links: Links,
}

impl LoopbackTransport {
    /// Create a loopback network. With `auto_pair`, a QR code counts as
    /// scanned after that delay.
    pub fn new(auto_pair: Option<Duration>) -> Self {
        Self {
            auto_pair,
            links: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Identity the simulated network assigns to a tenant's account
    pub fn identity_for(tenant: &TenantId) -> String {
        format!("loopback-{}", tenant)
    }

    /// Sender of the current connection; `open` also marks it authenticated
    fn current_sender(&self, tenant: &TenantId, open: bool) -> Option<mpsc::Sender<ClientEvent>> {
        let mut links = lock(&self.links);
        let link = links.get_mut(tenant)?;
        let (id, tx) = link.current.as_ref()?;
        let (id, tx) = (*id, tx.clone());
        if open {
            link.paired = Some(id);
        }
        Some(tx)
    }

    /// Deliver an event on the tenant's current connection.
    /// Returns false when there is no open connection.
    pub async fn emit(&self, tenant: &TenantId, event: ClientEvent) -> bool {
        let open = matches!(event, ClientEvent::Opened { .. });
        match self.current_sender(tenant, open) {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Complete QR pairing for the tenant's current connection
    pub async fn pair(&self, tenant: &TenantId) -> bool {
        match self.current_sender(tenant, true) {
            Some(tx) => emit_pairing(&tx, tenant).await,
            None => false,
        }
    }

    /// Simulate a network drop
    pub async fn drop_connection(&self, tenant: &TenantId, detail: &str) -> bool {
        self.emit(
            tenant,
            ClientEvent::Closed(DisconnectReason::Other(detail.to_string())),
        )
        .await
    }

    /// Simulate an inbound text message
    pub async fn deliver_text(&self, tenant: &TenantId, from: &str, text: &str) -> bool {
        let message = InboundMessage {
            id: Uuid::new_v4().simple().to_string().to_uppercase(),
            remote: Address::from_network(from),
            from_me: false,
            text: Some(text.to_string()),
            has_media: false,
            received_at: Utc::now(),
        };
        self.emit(tenant, ClientEvent::MessageReceived(message)).await
    }

    /// Make the next connect attempt for a tenant fail
    pub fn fail_next_connect(&self, tenant: &TenantId, reason: &str) {
        lock(&self.links)
            .entry(tenant.clone())
            .or_default()
            .fail_next_connect = Some(reason.to_string());
    }

    /// Make remote deauthorization fail for a tenant
    pub fn refuse_logout(&self, tenant: &TenantId) {
        lock(&self.links)
            .entry(tenant.clone())
            .or_default()
            .refuse_logout = true;
    }

    /// Number of connect attempts made for a tenant
    pub fn connect_count(&self, tenant: &TenantId) -> usize {
        lock(&self.links).get(tenant).map_or(0, |link| link.connects)
    }

    /// Number of connections currently open for a tenant
    pub fn open_connections(&self, tenant: &TenantId) -> usize {
        lock(&self.links).get(tenant).map_or(0, |link| link.open)
    }

    /// Messages sent from a tenant's account
    pub fn sent(&self, tenant: &TenantId) -> Vec<(Address, String)> {
        lock(&self.links)
            .get(tenant)
            .map(|link| link.sent.clone())
            .unwrap_or_default()
    }
}

async fn emit_pairing(tx: &mpsc::Sender<ClientEvent>, tenant: &TenantId) -> bool {
    let identity = LoopbackTransport::identity_for(tenant);
    let credentials = Credentials::new().with(
        "creds",
        serde_json::json!({
            "me": { "id": identity },
            "registered": true,
            "pairedAt": Utc::now().to_rfc3339(),
        }),
    );

    tx.send(ClientEvent::CredentialsUpdated(credentials))
        .await
        .is_ok()
        && tx
            .send(ClientEvent::Opened {
                identity: Some(identity),
            })
            .await
            .is_ok()
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Credentials,
    ) -> SessiondResult<Connection> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let authenticated = !credentials.is_empty();

        let conn_id = {
            let mut links = lock(&self.links);
            let link = links.entry(tenant.clone()).or_default();
            link.connects += 1;

            if let Some(reason) = link.fail_next_connect.take() {
                return Err(SessiondError::handshake(tenant.as_str(), reason));
            }

            link.next_conn_id += 1;
            link.open += 1;
            link.current = Some((link.next_conn_id, tx.clone()));
            if authenticated {
                link.paired = Some(link.next_conn_id);
            }
            link.next_conn_id
        };

        let token = CancellationToken::new();

        if !authenticated {
            let qr = format!("2@{}", Uuid::new_v4().simple());
            debug!(tenant = %tenant, "Loopback issuing QR code");
            // Fresh channel, capacity is available
            let _ = tx.try_send(ClientEvent::QrIssued(qr));

            if let Some(delay) = self.auto_pair {
                let tx = tx.clone();
                let tenant = tenant.clone();
                let token = token.clone();
                let links = Arc::clone(&self.links);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            if let Some(link) = lock(&links).get_mut(&tenant) {
                                link.paired = Some(conn_id);
                            }
                            emit_pairing(&tx, &tenant).await;
                        }
                    }
                });
            }
        } else {
            let identity = credentials
                .get("creds")
                .and_then(|c| c.pointer("/me/id"))
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| Self::identity_for(tenant));
            let _ = tx.try_send(ClientEvent::Opened {
                identity: Some(identity),
            });
        }

        let client = LoopbackClient {
            tenant: tenant.clone(),
            conn_id,
            links: Arc::clone(&self.links),
            token,
        };

        Ok(Connection {
            client: Arc::new(client),
            events: rx,
        })
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

struct LoopbackClient {
    tenant: TenantId,
    conn_id: u64,
    links: Links,
    token: CancellationToken,
}

impl LoopbackClient {
    fn my_sender(&self) -> Option<mpsc::Sender<ClientEvent>> {
        lock(&self.links).get(&self.tenant).and_then(|link| {
            link.current
                .as_ref()
                .filter(|(id, _)| *id == self.conn_id)
                .map(|(_, tx)| tx.clone())
        })
    }
}

#[async_trait]
impl SessionClient for LoopbackClient {
    async fn send_text(&self, to: &Address, body: &str) -> SessiondResult<SendReceipt> {
        if self.token.is_cancelled() {
            return Err(SessiondError::TransportSend {
                tenant: self.tenant.to_string(),
                reason: "connection closed".to_string(),
            });
        }
        let paired = lock(&self.links)
            .get(&self.tenant)
            .is_some_and(|link| link.paired == Some(self.conn_id));
        if !paired {
            return Err(SessiondError::TransportSend {
                tenant: self.tenant.to_string(),
                reason: "session is not paired".to_string(),
            });
        }

        lock(&self.links)
            .entry(self.tenant.clone())
            .or_default()
            .sent
            .push((to.clone(), body.to_string()));

        Ok(SendReceipt {
            message_id: format!("3EB0{}", Uuid::new_v4().simple().to_string().to_uppercase()),
            to: to.clone(),
        })
    }

    async fn logout(&self) -> SessiondResult<()> {
        let refused = lock(&self.links)
            .get(&self.tenant)
            .is_some_and(|link| link.refuse_logout);
        if refused {
            return Err(SessiondError::TransportSend {
                tenant: self.tenant.to_string(),
                reason: "deauthorization refused".to_string(),
            });
        }

        if let Some(tx) = self.my_sender() {
            // The reader may already be gone; the close is best effort
            let _ = tx.try_send(ClientEvent::Closed(DisconnectReason::LoggedOut));
        }
        Ok(())
    }

    async fn close(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();

        let mut links = lock(&self.links);
        if let Some(link) = links.get_mut(&self.tenant) {
            link.open = link.open.saturating_sub(1);
            if link
                .current
                .as_ref()
                .is_some_and(|(id, _)| *id == self.conn_id)
            {
                link.current = None;
            }
        }
    }
}
