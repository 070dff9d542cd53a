//! Session event fan-out
//!
//! Handlers are plain synchronous callbacks, invoked after the state change
//! they describe has been applied. There is no buffering or replay.

use crate::session::state::SessionState;
use crate::tenant::TenantId;
use crate::transport::{DisconnectReason, InboundMessage};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::error;
use uuid::Uuid;

/// Something that happened to a tenant's session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged(SessionState),
    QrIssued(String),
    Connected { identity: Option<String> },
    Disconnected(DisconnectReason),
    MessageReceived(InboundMessage),
}

impl SessionEvent {
    /// Dotted event name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged(_) => "session.state",
            Self::QrIssued(_) => "session.qr",
            Self::Connected { .. } => "session.connected",
            Self::Disconnected(_) => "session.disconnected",
            Self::MessageReceived(_) => "session.message",
        }
    }
}

/// Subscriber callback
pub type EventHandler = Arc<dyn Fn(&TenantId, &SessionEvent) + Send + Sync>;

/// Registration list owned by one supervisor
#[derive(Default)]
pub(crate) struct Subscribers {
    handlers: Mutex<Vec<(Uuid, EventHandler)>>,
}

impl Subscribers {
    fn handlers(&self) -> MutexGuard<'_, Vec<(Uuid, EventHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, handler: EventHandler) -> Uuid {
        let id = Uuid::new_v4();
        self.handlers().push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: Uuid) -> bool {
        let mut handlers = self.handlers();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers().len()
    }

    /// Call every handler; a panicking handler is logged and skipped
    pub(crate) fn notify(&self, tenant: &TenantId, event: &SessionEvent) {
        // Clone the list so handlers may subscribe or unsubscribe
        let handlers: Vec<EventHandler> = self
            .handlers()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(tenant, event))).is_err() {
                error!(
                    tenant = %tenant,
                    event = event.name(),
                    "Session event handler panicked"
                );
            }
        }
    }
}

/// Handle to a registered handler; unsubscribes when dropped
pub struct Subscription {
    id: Uuid,
    subscribers: Weak<Subscribers>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(id: Uuid, subscribers: &Arc<Subscribers>) -> Self {
        Self {
            id,
            subscribers: Arc::downgrade(subscribers),
            active: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remove the handler now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the handler registered for the supervisor's lifetime
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
