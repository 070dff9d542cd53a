//! Process-wide tenant → supervisor map

use crate::config::{schema::Config, ConfigManager};
use crate::credentials::FsCredentialStore;
use crate::journal::Journal;
use crate::session::state::SessionSnapshot;
use crate::session::supervisor::{Supervisor, SupervisorSettings};
use crate::tenant::{credential_dir, TenantId};
use crate::transport::Transport;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Lazily populated registry of supervisors.
///
/// Entries are never removed; a logged-out tenant keeps its idle supervisor
/// so it can be started again.
pub struct SessionRegistry {
    session_root: PathBuf,
    settings: SupervisorSettings,
    transport: Arc<dyn Transport>,
    journal: Option<Journal>,
    sessions: RwLock<HashMap<TenantId, Arc<Supervisor>>>,
}

impl SessionRegistry {
    pub fn new(
        session_root: impl Into<PathBuf>,
        settings: SupervisorSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            session_root: session_root.into(),
            settings,
            transport,
            journal: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry from the loaded configuration
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            ConfigManager::session_root(config),
            SupervisorSettings::from(&config.sessions),
            transport,
        )
    }

    /// Record every supervisor's events in the journal
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn session_root(&self) -> &Path {
        &self.session_root
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TenantId, Arc<Supervisor>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TenantId, Arc<Supervisor>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the tenant's supervisor, creating an idle one on first use
    pub fn ensure(&self, tenant: &TenantId) -> Arc<Supervisor> {
        if let Some(existing) = self.read().get(tenant) {
            return Arc::clone(existing);
        }

        let mut sessions = self.write();
        let supervisor = sessions.entry(tenant.clone()).or_insert_with(|| {
            let dir = credential_dir(&self.session_root, tenant);
            debug!(tenant = %tenant, path = %dir.display(), "Creating supervisor");

            let store = Arc::new(FsCredentialStore::new(&self.session_root, tenant));
            let supervisor = Supervisor::new(
                tenant.clone(),
                self.settings.clone(),
                Arc::clone(&self.transport),
                store,
            );
            if let Some(journal) = &self.journal {
                supervisor.subscribe_handler(journal.handler()).detach();
            }
            supervisor
        });
        Arc::clone(supervisor)
    }

    /// Get the tenant's supervisor without creating one
    pub fn get(&self, tenant: &TenantId) -> Option<Arc<Supervisor>> {
        self.read().get(tenant).cloned()
    }

    /// Current snapshot; tenants without a supervisor read as idle
    pub fn status(&self, tenant: &TenantId) -> SessionSnapshot {
        self.get(tenant)
            .map(|supervisor| supervisor.status())
            .unwrap_or_else(|| SessionSnapshot::idle(tenant.clone()))
    }

    /// Known tenants, sorted
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.read().keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Snapshots of every known tenant, sorted by tenant
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> =
            self.read().values().map(|s| s.status()).collect();
        snapshots.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close every live session, keeping stored credentials
    pub async fn shutdown(&self) {
        let supervisors: Vec<Arc<Supervisor>> = self.read().values().cloned().collect();
        info!(sessions = supervisors.len(), "Shutting down sessions");

        for supervisor in supervisors {
            supervisor.shutdown().await;
        }
    }
}
