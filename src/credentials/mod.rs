//! Session credential material and its per-tenant persistence
//!
//! The material itself is opaque: the transport decides what it needs to
//! resume a paired session, hands it over as named JSON entries, and gets
//! the same entries back on the next connect.

pub mod store;

pub use store::{FsCredentialStore, StoredSession};

use crate::error::SessiondResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Named credential entries for one tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    entries: BTreeMap<String, serde_json::Value>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.entries.get(name)
    }

    /// Overlay `other` on top of these entries
    pub fn merge(&mut self, other: Credentials) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.entries.iter()
    }
}

/// Durable, tenant-scoped credential persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials; a store that was never written is empty
    async fn load(&self) -> SessiondResult<Credentials>;

    /// Persist the given entries, replacing same-named ones
    async fn save(&self, credentials: &Credentials) -> SessiondResult<()>;

    /// Remove every entry and the backing location itself
    async fn wipe(&self) -> SessiondResult<()>;

    /// Whether anything is currently stored
    async fn exists(&self) -> bool;

    /// Backing location, for logging
    fn path(&self) -> &Path;
}
