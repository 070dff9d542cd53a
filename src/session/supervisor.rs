//! Per-tenant session supervisor
//!
//! A supervisor owns at most one live [`SessionClient`] for its tenant. Start,
//! logout, shutdown and the application of client events all run under one
//! async lifecycle lock, so a tenant's state transitions are totally ordered.
//! The snapshot fields live behind a plain mutex and can be read without
//! waiting on any of that.

use crate::address::Address;
use crate::config::schema::SessionsConfig;
use crate::credentials::CredentialStore;
use crate::error::{SessiondError, SessiondResult};
use crate::session::events::{EventHandler, SessionEvent, Subscribers, Subscription};
use crate::session::reconnect::ReconnectTimer;
use crate::session::state::{SessionSnapshot, SessionState};
use crate::tenant::TenantId;
use crate::transport::{
    ClientEvent, Connection, DisconnectReason, SendReceipt, SessionClient, Transport,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing and policy knobs shared by every supervisor
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub reconnect_delay: Duration,
    pub start_timeout: Duration,
    pub send_timeout: Duration,
    pub logout_timeout: Duration,
    /// Start an idle or disconnected session when a send arrives
    pub auto_start_on_send: bool,
    pub country_code: Option<String>,
}

impl From<&SessionsConfig> for SupervisorSettings {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            start_timeout: config.start_timeout(),
            send_timeout: config.send_timeout(),
            logout_timeout: config.logout_timeout(),
            auto_start_on_send: config.auto_start_on_send,
            country_code: config.country_code().map(str::to_string),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&SessionsConfig::default())
    }
}

struct Inner {
    state: SessionState,
    client: Option<Arc<dyn SessionClient>>,
    last_qr: Option<String>,
    identity: Option<String>,
    /// Set by logout and shutdown; blocks automatic reconnects
    stop_requested: bool,
    /// Bumped whenever a client is attached or forcibly detached
    generation: u64,
    loop_token: Option<CancellationToken>,
}

impl Inner {
    fn detach(&mut self) -> Option<Arc<dyn SessionClient>> {
        self.generation += 1;
        if let Some(token) = self.loop_token.take() {
            token.cancel();
        }
        self.client.take()
    }
}

/// Supervises one tenant's messaging session
pub struct Supervisor {
    tenant: TenantId,
    settings: SupervisorSettings,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    inner: Mutex<Inner>,
    /// Mirrors `Inner::state` for callers waiting on a transition
    states: watch::Sender<SessionState>,
    lifecycle: tokio::sync::Mutex<()>,
    reconnect: ReconnectTimer,
    subscribers: Arc<Subscribers>,
    me: Weak<Supervisor>,
}

impl Supervisor {
    /// Create an idle supervisor. Nothing touches the network or the
    /// credential store until [`Supervisor::start`].
    pub fn new(
        tenant: TenantId,
        settings: SupervisorSettings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            tenant,
            settings,
            transport,
            store,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                client: None,
                last_qr: None,
                identity: None,
                stop_requested: false,
                generation: 0,
                loop_token: None,
            }),
            states: watch::channel(SessionState::Idle).0,
            lifecycle: tokio::sync::Mutex::new(()),
            reconnect: ReconnectTimer::default(),
            subscribers: Arc::new(Subscribers::default()),
            me: me.clone(),
        })
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot, straight from memory
    pub fn status(&self) -> SessionSnapshot {
        let inner = self.inner();
        SessionSnapshot {
            tenant_id: self.tenant.clone(),
            state: inner.state,
            last_qr_payload: inner.last_qr.clone(),
            connected_identity: inner.identity.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner().state
    }

    /// Last QR payload, if one is waiting to be scanned
    pub fn qr(&self) -> Option<String> {
        self.inner().last_qr.clone()
    }

    pub fn has_client(&self) -> bool {
        self.inner().client.is_some()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    /// Register an event handler
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TenantId, &SessionEvent) + Send + Sync + 'static,
    {
        self.subscribe_handler(Arc::new(handler))
    }

    pub fn subscribe_handler(&self, handler: EventHandler) -> Subscription {
        let id = self.subscribers.add(handler);
        Subscription::new(id, &self.subscribers)
    }

    fn notify(&self, event: SessionEvent) {
        self.subscribers.notify(&self.tenant, &event);
    }

    /// Apply `update` and move to `next`; subscribers hear about the change
    /// once the inner lock is released
    fn transition(&self, next: SessionState, update: impl FnOnce(&mut Inner)) {
        let previous = {
            let mut inner = self.inner();
            update(&mut inner);
            self.states.send_replace(next);
            std::mem::replace(&mut inner.state, next)
        };

        if previous != next {
            debug!(
                tenant = %self.tenant,
                from = previous.as_str(),
                to = next.as_str(),
                "Session state changed"
            );
            self.notify(SessionEvent::StateChanged(next));
        }
    }

    /// Start the session. A no-op when a client is already live.
    pub async fn start(&self) -> SessiondResult<SessionSnapshot> {
        let _lifecycle = self.lifecycle.lock().await;
        self.reconnect.cancel();
        self.inner().stop_requested = false;
        self.start_locked().await?;
        Ok(self.status())
    }

    async fn start_locked(&self) -> SessiondResult<()> {
        let has_client = self.inner().client.is_some();
        if has_client {
            debug!(tenant = %self.tenant, "Session already has a live client");
            return Ok(());
        }

        self.transition(SessionState::Connecting, |inner| {
            inner.last_qr = None;
            inner.identity = None;
        });
        info!(
            tenant = %self.tenant,
            transport = self.transport.name(),
            "Starting session"
        );

        let connect = async {
            let credentials = self.store.load().await?;
            debug!(
                tenant = %self.tenant,
                entries = credentials.len(),
                "Loaded credentials"
            );
            self.transport.connect(&self.tenant, credentials).await
        };

        let result = match time::timeout(self.settings.start_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(SessiondError::Timeout {
                operation: "start",
                tenant: self.tenant.to_string(),
                secs: self.settings.start_timeout.as_secs(),
            }),
        };

        match result {
            Ok(connection) => {
                self.attach(connection);
                Ok(())
            }
            Err(err) if err.is_retryable() => {
                warn!(tenant = %self.tenant, error = %err, "Session start failed");
                self.transition(SessionState::Disconnected, |_| {});
                self.schedule_reconnect();
                Err(err)
            }
            // Credential store failures would fail the same way again
            Err(err) => {
                error!(tenant = %self.tenant, error = %err, "Session start failed, not retrying");
                self.transition(SessionState::Disconnected, |_| {});
                Err(err)
            }
        }
    }

    fn attach(&self, connection: Connection) {
        let Connection { client, events } = connection;
        let token = CancellationToken::new();

        let generation = {
            let mut inner = self.inner();
            inner.generation += 1;
            inner.client = Some(client);
            if let Some(previous) = inner.loop_token.replace(token.clone()) {
                previous.cancel();
            }
            inner.generation
        };

        tokio::spawn(Self::event_loop(self.me.clone(), generation, events, token));
    }

    async fn event_loop(
        me: Weak<Self>,
        generation: u64,
        mut events: mpsc::Receiver<ClientEvent>,
        token: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };

            let Some(supervisor) = me.upgrade() else {
                break;
            };

            let event = event.unwrap_or_else(|| {
                ClientEvent::Closed(DisconnectReason::Other("event stream ended".to_string()))
            });
            let closed = matches!(event, ClientEvent::Closed(_));

            supervisor.apply(generation, event).await;
            if closed {
                break;
            }
        }
    }

    async fn apply(&self, generation: u64, event: ClientEvent) {
        let _lifecycle = self.lifecycle.lock().await;

        let current = {
            let inner = self.inner();
            inner.generation == generation && inner.client.is_some()
        };
        if !current {
            debug!(tenant = %self.tenant, "Ignoring event from a superseded connection");
            return;
        }

        match event {
            ClientEvent::CredentialsUpdated(credentials) => {
                if let Err(err) = self.store.save(&credentials).await {
                    error!(tenant = %self.tenant, error = %err, "Failed to persist credentials");
                }
            }
            ClientEvent::QrIssued(qr) => {
                info!(tenant = %self.tenant, "QR code issued");
                self.transition(SessionState::AwaitingQrScan, |inner| {
                    inner.last_qr = Some(qr.clone());
                });
                self.notify(SessionEvent::QrIssued(qr));
            }
            ClientEvent::Opened { identity } => {
                info!(
                    tenant = %self.tenant,
                    identity = identity.as_deref().unwrap_or("-"),
                    "Session connected"
                );
                self.transition(SessionState::Connected, |inner| {
                    inner.last_qr = None;
                    inner.identity = identity.clone();
                });
                self.notify(SessionEvent::Connected { identity });
            }
            ClientEvent::Closed(reason) => self.on_closed(reason).await,
            ClientEvent::MessageReceived(message) => {
                debug!(
                    tenant = %self.tenant,
                    remote = %message.remote,
                    "Message received"
                );
                self.notify(SessionEvent::MessageReceived(message));
            }
        }
    }

    async fn on_closed(&self, reason: DisconnectReason) {
        let (client, stop_requested) = {
            let mut inner = self.inner();
            inner.loop_token = None;
            (inner.client.take(), inner.stop_requested)
        };
        if let Some(client) = client {
            client.close().await;
        }

        match &reason {
            DisconnectReason::LoggedOut => {
                warn!(tenant = %self.tenant, "Device was logged out, wiping credentials");
                if let Err(err) = self.store.wipe().await {
                    error!(tenant = %self.tenant, error = %err, "Failed to wipe credentials");
                }
                self.transition(SessionState::LoggedOut, |inner| {
                    inner.last_qr = None;
                    inner.identity = None;
                });
            }
            DisconnectReason::Other(detail) => {
                warn!(tenant = %self.tenant, reason = %detail, "Session disconnected");
                self.transition(SessionState::Disconnected, |inner| {
                    inner.last_qr = None;
                    inner.identity = None;
                });
                if !stop_requested {
                    self.schedule_reconnect();
                }
            }
        }

        self.notify(SessionEvent::Disconnected(reason));
    }

    fn schedule_reconnect(&self) {
        let delay = self.settings.reconnect_delay;
        info!(
            tenant = %self.tenant,
            delay_secs = delay.as_secs(),
            "Scheduling reconnect"
        );

        let me = self.me.clone();
        self.reconnect.schedule(delay, move |token| async move {
            if let Some(supervisor) = me.upgrade() {
                supervisor.resume(token).await;
            }
        });
    }

    async fn resume(&self, token: CancellationToken) {
        let _lifecycle = self.lifecycle.lock().await;

        let stop_requested = self.inner().stop_requested;
        if stop_requested || !self.reconnect.fire(&token) {
            return;
        }

        debug!(tenant = %self.tenant, "Reconnecting");
        if let Err(err) = self.start_locked().await {
            debug!(tenant = %self.tenant, error = %err, "Reconnect attempt failed");
        }
    }

    /// Send a text message.
    ///
    /// Waits behind any start in progress. With `auto_start_on_send`, an idle
    /// or disconnected session is started first. The message goes out once
    /// the session is `Connected`; a session still connecting or waiting on
    /// a QR scan gets `send_timeout` to open before the send fails with
    /// `NotConnected`.
    pub async fn send_text(&self, to: &str, body: &str) -> SessiondResult<SendReceipt> {
        if body.trim().is_empty() {
            return Err(SessiondError::EmptyMessage);
        }
        let address = Address::normalize(to, self.settings.country_code.as_deref())?;

        {
            let _lifecycle = self.lifecycle.lock().await;
            let (has_client, state) = {
                let inner = self.inner();
                (inner.client.is_some(), inner.state)
            };

            if !has_client {
                if !(self.settings.auto_start_on_send && state.can_auto_start()) {
                    return Err(self.not_connected());
                }
                debug!(tenant = %self.tenant, "Starting session before send");
                self.reconnect.cancel();
                if let Err(err) = self.start_locked().await {
                    warn!(tenant = %self.tenant, error = %err, "Could not start session for send");
                    return Err(self.not_connected());
                }
            }
        }

        let client = self.connected_client().await?;

        let receipt = time::timeout(self.settings.send_timeout, client.send_text(&address, body))
            .await
            .map_err(|_| SessiondError::Timeout {
                operation: "send",
                tenant: self.tenant.to_string(),
                secs: self.settings.send_timeout.as_secs(),
            })??;

        info!(
            tenant = %self.tenant,
            to = %receipt.to,
            message_id = %receipt.message_id,
            "Message sent"
        );
        Ok(receipt)
    }

    /// Wait, bounded by `send_timeout`, for the session to leave the
    /// connecting states, then hand out the client if it ended up connected
    async fn connected_client(&self) -> SessiondResult<Arc<dyn SessionClient>> {
        let mut states = self.states.subscribe();
        let opening = |state: &SessionState| {
            !matches!(state, SessionState::Connecting | SessionState::AwaitingQrScan)
        };
        let _ = time::timeout(self.settings.send_timeout, states.wait_for(opening)).await;

        let inner = self.inner();
        match (&inner.client, inner.state) {
            (Some(client), SessionState::Connected) => Ok(Arc::clone(client)),
            (_, state) => {
                debug!(
                    tenant = %self.tenant,
                    state = state.as_str(),
                    "Session not connected for send"
                );
                Err(self.not_connected())
            }
        }
    }

    fn not_connected(&self) -> SessiondError {
        SessiondError::NotConnected(self.tenant.to_string())
    }

    /// Log out: deauthorize remotely when possible, then always close the
    /// client, wipe local credentials and land in `LoggedOut`.
    ///
    /// Only a failure to wipe the credential store is returned.
    pub async fn logout(&self) -> SessiondResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.reconnect.cancel();

        let client = {
            let mut inner = self.inner();
            inner.stop_requested = true;
            inner.detach()
        };

        let had_client = client.is_some();
        if let Some(client) = client {
            let remote = match time::timeout(self.settings.logout_timeout, client.logout()).await
            {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some(format!(
                    "timed out after {}s",
                    self.settings.logout_timeout.as_secs()
                )),
            };
            if let Some(reason) = remote {
                let err = SessiondError::LogoutPartialFailure {
                    tenant: self.tenant.to_string(),
                    reason,
                };
                warn!(tenant = %self.tenant, error = %err, "Remote logout failed");
            }
            client.close().await;
        }

        let wiped = self.store.wipe().await;
        self.transition(SessionState::LoggedOut, |inner| {
            inner.last_qr = None;
            inner.identity = None;
        });
        if had_client {
            self.notify(SessionEvent::Disconnected(DisconnectReason::LoggedOut));
        }

        match &wiped {
            Ok(()) => info!(tenant = %self.tenant, "Session logged out"),
            Err(err) => error!(tenant = %self.tenant, error = %err, "Failed to wipe credentials"),
        }
        wiped
    }

    /// Close the client without touching credentials, for process stop
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.reconnect.cancel();

        let client = {
            let mut inner = self.inner();
            inner.stop_requested = true;
            inner.detach()
        };

        if let Some(client) = client {
            client.close().await;
            self.transition(SessionState::Disconnected, |inner| {
                inner.last_qr = None;
                inner.identity = None;
            });
            debug!(tenant = %self.tenant, "Session closed for shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, FsCredentialStore};
    use crate::transport::LoopbackTransport;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// In-memory store, so paused-clock tests never wait on the blocking pool
    #[derive(Default)]
    struct MemoryStore {
        credentials: Mutex<Credentials>,
        fail_load: AtomicBool,
        path: PathBuf,
    }

    impl MemoryStore {
        fn with_credentials(credentials: Credentials) -> Self {
            Self {
                credentials: Mutex::new(credentials),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> Credentials {
            self.credentials.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn load(&self) -> SessiondResult<Credentials> {
            if self.fail_load.load(Ordering::SeqCst) {
                return Err(SessiondError::store(
                    "acme",
                    "reading credentials",
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ));
            }
            Ok(self.snapshot())
        }

        async fn save(&self, credentials: &Credentials) -> SessiondResult<()> {
            self.credentials.lock().unwrap().merge(credentials.clone());
            Ok(())
        }

        async fn wipe(&self) -> SessiondResult<()> {
            *self.credentials.lock().unwrap() = Credentials::new();
            Ok(())
        }

        async fn exists(&self) -> bool {
            !self.snapshot().is_empty()
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    fn acme() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn supervisor(
        transport: &Arc<LoopbackTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Arc<Supervisor> {
        Supervisor::new(
            acme(),
            SupervisorSettings::default(),
            transport.clone(),
            store,
        )
    }

    async fn wait_for(supervisor: &Supervisor, state: SessionState) {
        for _ in 0..200 {
            if supervisor.state() == state {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {:?}, still {:?}", state, supervisor.state());
    }

    #[tokio::test]
    async fn start_issues_qr_then_connects() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = Arc::new(FsCredentialStore::new(temp.path(), &acme()));
        let sup = supervisor(&transport, store.clone());

        assert_eq!(sup.status(), SessionSnapshot::idle(acme()));

        let snapshot = sup.start().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Connecting);

        wait_for(&sup, SessionState::AwaitingQrScan).await;
        assert!(sup.qr().unwrap().starts_with("2@"));

        assert!(transport.pair(&acme()).await);
        wait_for(&sup, SessionState::Connected).await;

        let status = sup.status();
        assert_eq!(status.last_qr_payload, None);
        assert_eq!(
            status.connected_identity,
            Some(LoopbackTransport::identity_for(&acme()))
        );
        assert!(store.exists().await);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        sup.start().await.unwrap();
        sup.start().await.unwrap();

        assert_eq!(transport.connect_count(&acme()), 1);
        assert_eq!(transport.open_connections(&acme()), 1);
    }

    #[tokio::test]
    async fn logout_wipes_credentials_and_restart_needs_new_qr() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = Arc::new(FsCredentialStore::new(temp.path(), &acme()));
        let sup = supervisor(&transport, store.clone());

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;
        transport.pair(&acme()).await;
        wait_for(&sup, SessionState::Connected).await;
        assert!(store.path().exists());

        sup.logout().await.unwrap();
        assert_eq!(sup.state(), SessionState::LoggedOut);
        assert!(!store.path().exists());
        assert!(!sup.has_client());
        assert_eq!(transport.open_connections(&acme()), 0);

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_unexpected_disconnect() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;
        transport.pair(&acme()).await;
        wait_for(&sup, SessionState::Connected).await;

        transport.drop_connection(&acme(), "stream errored").await;
        wait_for(&sup, SessionState::Disconnected).await;
        assert!(sup.reconnect_pending());
        assert_eq!(transport.connect_count(&acme()), 1);

        time::sleep(Duration::from_millis(3100)).await;
        wait_for(&sup, SessionState::Connected).await;
        assert_eq!(transport.connect_count(&acme()), 2);
        assert_eq!(transport.open_connections(&acme()), 1);
        assert!(sup.has_client());
        assert!(!sup.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_cancels_pending_reconnect() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;
        transport.drop_connection(&acme(), "stream errored").await;
        wait_for(&sup, SessionState::Disconnected).await;

        sup.logout().await.unwrap();
        assert!(!sup.reconnect_pending());

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sup.state(), SessionState::LoggedOut);
        assert_eq!(transport.connect_count(&acme()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_failure_schedules_reconnect() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));
        transport.fail_next_connect(&acme(), "connection refused");

        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, SessiondError::TransportHandshake { .. }));
        assert_eq!(sup.state(), SessionState::Disconnected);
        assert!(sup.reconnect_pending());

        time::sleep(Duration::from_millis(3100)).await;
        wait_for(&sup, SessionState::AwaitingQrScan).await;
        assert_eq!(transport.connect_count(&acme()), 2);
    }

    #[tokio::test]
    async fn credential_load_failure_does_not_reconnect() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = Arc::new(MemoryStore::default());
        store.fail_load.store(true, Ordering::SeqCst);
        let sup = supervisor(&transport, store);

        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, SessiondError::CredentialStore { .. }));
        assert_eq!(sup.state(), SessionState::Disconnected);
        assert!(!sup.reconnect_pending());
        assert_eq!(transport.connect_count(&acme()), 0);
    }

    #[tokio::test]
    async fn network_logout_wipes_and_stays_down() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(&transport, store.clone());

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;
        transport.pair(&acme()).await;
        wait_for(&sup, SessionState::Connected).await;
        assert!(store.exists().await);

        transport
            .emit(&acme(), ClientEvent::Closed(DisconnectReason::LoggedOut))
            .await;
        wait_for(&sup, SessionState::LoggedOut).await;
        assert!(!store.exists().await);
        assert!(!sup.reconnect_pending());
    }

    #[tokio::test]
    async fn send_rejects_bad_input_without_network_call() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        assert!(matches!(
            sup.send_text("", "hola").await,
            Err(SessiondError::InvalidAddress(_))
        ));
        assert!(matches!(
            sup.send_text("5215512345678", "  ").await,
            Err(SessiondError::EmptyMessage)
        ));
        assert_eq!(transport.connect_count(&acme()), 0);
        assert!(transport.sent(&acme()).is_empty());
    }

    #[tokio::test]
    async fn send_auto_starts_idle_session() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = MemoryStore::with_credentials(
            Credentials::new().with("creds", serde_json::json!({"me": {"id": "acme-phone"}})),
        );
        let sup = supervisor(&transport, Arc::new(store));

        let receipt = sup.send_text("+52 1 55 1234 5678", "hola").await.unwrap();
        assert_eq!(receipt.to.as_str(), "5215512345678@s.whatsapp.net");
        assert_eq!(transport.connect_count(&acme()), 1);
        assert_eq!(transport.sent(&acme()).len(), 1);

        wait_for(&sup, SessionState::Connected).await;
    }

    fn short_send_timeout() -> SupervisorSettings {
        SupervisorSettings {
            send_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn send_on_unpaired_tenant_is_not_connected() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = Supervisor::new(
            acme(),
            short_send_timeout(),
            transport.clone(),
            Arc::new(MemoryStore::default()),
        );

        assert!(matches!(
            sup.send_text("5215512345678", "hola").await,
            Err(SessiondError::NotConnected(_))
        ));
        assert_eq!(sup.state(), SessionState::AwaitingQrScan);
        assert_eq!(transport.connect_count(&acme()), 1);

        // Still waiting on the scan: no auto-start, no delivery
        assert!(matches!(
            sup.send_text("5215512345678", "hola").await,
            Err(SessiondError::NotConnected(_))
        ));
        assert_eq!(transport.connect_count(&acme()), 1);
        assert!(transport.sent(&acme()).is_empty());
    }

    #[tokio::test]
    async fn send_waits_for_pairing() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;

        let sending = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.send_text("5215512345678", "hola").await })
        };
        time::sleep(Duration::from_millis(50)).await;
        assert!(transport.sent(&acme()).is_empty());

        assert!(transport.pair(&acme()).await);
        let receipt = sending.await.unwrap().unwrap();
        assert_eq!(receipt.to.as_str(), "5215512345678@s.whatsapp.net");
        assert_eq!(transport.sent(&acme()).len(), 1);
    }

    #[tokio::test]
    async fn send_fails_fast_when_auto_start_is_off() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let settings = SupervisorSettings {
            auto_start_on_send: false,
            ..Default::default()
        };
        let sup = Supervisor::new(
            acme(),
            settings,
            transport.clone(),
            Arc::new(MemoryStore::default()),
        );

        assert!(matches!(
            sup.send_text("5215512345678", "hola").await,
            Err(SessiondError::NotConnected(_))
        ));
        assert_eq!(transport.connect_count(&acme()), 0);
    }

    #[tokio::test]
    async fn send_after_logout_is_not_connected() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        sup.logout().await.unwrap();
        assert!(matches!(
            sup.send_text("5215512345678", "hola").await,
            Err(SessiondError::NotConnected(_))
        ));
        assert_eq!(transport.connect_count(&acme()), 0);
    }

    #[tokio::test]
    async fn refused_remote_logout_still_clears_local_state() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = Arc::new(MemoryStore::with_credentials(
            Credentials::new().with("creds", serde_json::json!({"registered": true})),
        ));
        let sup = supervisor(&transport, store.clone());

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::Connected).await;
        transport.refuse_logout(&acme());

        sup.logout().await.unwrap();
        assert_eq!(sup.state(), SessionState::LoggedOut);
        assert!(!store.exists().await);
        assert_eq!(transport.open_connections(&acme()), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_applied_state() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let sup = supervisor(&transport, Arc::new(MemoryStore::default()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&sup);
        let sink = Arc::clone(&seen);
        let _subscription = sup.subscribe(move |_, event| {
            if let (SessionEvent::QrIssued(qr), Some(sup)) = (event, weak.upgrade()) {
                sink.lock().unwrap().push((sup.state(), sup.qr(), qr.clone()));
            }
        });

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::AwaitingQrScan).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (state, cached, issued) = &seen[0];
        assert_eq!(*state, SessionState::AwaitingQrScan);
        assert_eq!(cached.as_deref(), Some(issued.as_str()));
    }

    #[tokio::test]
    async fn shutdown_keeps_credentials() {
        let transport = Arc::new(LoopbackTransport::new(None));
        let store = Arc::new(MemoryStore::with_credentials(
            Credentials::new().with("creds", serde_json::json!({"registered": true})),
        ));
        let sup = supervisor(&transport, store.clone());

        sup.start().await.unwrap();
        wait_for(&sup, SessionState::Connected).await;

        sup.shutdown().await;
        assert_eq!(sup.state(), SessionState::Disconnected);
        assert!(!sup.reconnect_pending());
        assert!(store.exists().await);
        assert_eq!(transport.open_connections(&acme()), 0);
    }
}
