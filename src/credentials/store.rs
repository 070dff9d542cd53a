//! Filesystem credential store: one directory per tenant, one JSON file per entry

use super::{CredentialStore, Credentials};
use crate::error::{SessiondError, SessiondResult};
use crate::tenant::{credential_dir, is_safe_char, TenantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Credential store rooted at `{root}/{tenant}`
pub struct FsCredentialStore {
    tenant: TenantId,
    dir: PathBuf,
}

/// A tenant found on disk under the session root
#[derive(Debug, Clone, Serialize)]
pub struct StoredSession {
    pub tenant: String,
    pub entries: usize,
    pub modified: Option<DateTime<Utc>>,
}

impl FsCredentialStore {
    /// Create a store for a tenant under the session root
    pub fn new(root: &Path, tenant: &TenantId) -> Self {
        Self {
            tenant: tenant.clone(),
            dir: credential_dir(root, tenant),
        }
    }

    /// Enumerate tenants that currently have a credential directory
    pub async fn list(root: &Path) -> SessiondResult<Vec<StoredSession>> {
        if !root.exists() {
            return Ok(vec![]);
        }

        let mut sessions = vec![];
        let mut entries = fs::read_dir(root)
            .await
            .map_err(|e| SessiondError::io("reading session root", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessiondError::io("reading session root entry", e))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(tenant) = TenantId::parse(name) else {
                continue;
            };
            if !path.is_dir() {
                continue;
            }

            let modified = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);
            let entries = FsCredentialStore::new(root, &tenant)
                .entry_files()
                .await
                .map(|files| files.len())
                .unwrap_or(0);

            sessions.push(StoredSession {
                tenant: tenant.to_string(),
                entries,
                modified,
            });
        }

        sessions.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        Ok(sessions)
    }

    fn err(&self, context: impl Into<String>, source: std::io::Error) -> SessiondError {
        SessiondError::store(self.tenant.as_str(), context, source)
    }

    fn entry_path(&self, name: &str) -> SessiondResult<PathBuf> {
        if !is_valid_entry_name(name) {
            return Err(self.err(
                format!("invalid credential entry name {:?}", name),
                std::io::Error::new(ErrorKind::InvalidInput, "unsafe entry name"),
            ));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    async fn entry_files(&self) -> SessiondResult<Vec<(String, PathBuf)>> {
        let mut files = vec![];
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(self.err("reading credential directory", e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.err("reading credential entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    files.push((stem.to_string(), path));
                }
            }
        }

        Ok(files)
    }

    async fn ensure_dir(&self) -> SessiondResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.err("creating credential directory", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(&self.dir, perms)
                .await
                .map_err(|e| self.err("setting credential directory permissions", e))?;
        }

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FsCredentialStore {
    async fn load(&self) -> SessiondResult<Credentials> {
        let mut credentials = Credentials::new();

        for (name, path) in self.entry_files().await? {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| self.err(format!("reading {}", path.display()), e))?;

            match serde_json::from_str(&content) {
                Ok(value) => credentials.insert(name, value),
                Err(e) => warn!(
                    tenant = %self.tenant,
                    "Skipping unreadable credential entry {}: {}",
                    path.display(),
                    e
                ),
            }
        }

        debug!(
            tenant = %self.tenant,
            "Loaded {} credential entries from {}",
            credentials.len(),
            self.dir.display()
        );
        Ok(credentials)
    }

    async fn save(&self, credentials: &Credentials) -> SessiondResult<()> {
        self.ensure_dir().await?;

        for (name, value) in credentials.iter() {
            let path = self.entry_path(name)?;
            let tmp = path.with_extension("json.tmp");
            let content = serde_json::to_vec(value)?;

            fs::write(&tmp, content)
                .await
                .map_err(|e| self.err(format!("writing {}", tmp.display()), e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o600);
                fs::set_permissions(&tmp, perms)
                    .await
                    .map_err(|e| self.err("setting credential file permissions", e))?;
            }

            fs::rename(&tmp, &path)
                .await
                .map_err(|e| self.err(format!("replacing {}", path.display()), e))?;
        }

        debug!(
            tenant = %self.tenant,
            "Saved {} credential entries",
            credentials.len()
        );
        Ok(())
    }

    async fn wipe(&self) -> SessiondResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(tenant = %self.tenant, "Wiped {}", self.dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.err("removing credential directory", e)),
        }
    }

    async fn exists(&self) -> bool {
        self.entry_files()
            .await
            .map(|files| !files.is_empty())
            .unwrap_or(false)
    }

    fn path(&self) -> &Path {
        &self.dir
    }
}

fn is_valid_entry_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.len() <= 255
        && name.chars().all(|c| is_safe_char(c) || c == '.')
}
