//! Tenant identifiers
//!
//! A tenant id is both the registry key and the name of the tenant's
//! credential directory, so it is validated against a strict allowlist
//! before it is ever joined onto a filesystem path.

use crate::error::{SessiondError, SessiondResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Longest accepted tenant id
pub const MAX_TENANT_LEN: usize = 128;

/// Validated tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parse an untrusted tenant id
    pub fn parse(raw: &str) -> SessiondResult<Self> {
        let invalid = |reason: &str| SessiondError::InvalidTenant {
            id: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if raw.len() > MAX_TENANT_LEN {
            return Err(invalid("too long"));
        }
        if !raw.chars().all(is_safe_char) {
            return Err(invalid("only ASCII letters, digits, '-' and '_' are allowed"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = SessiondError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<TenantId> for String {
    fn from(tenant: TenantId) -> Self {
        tenant.0
    }
}

pub(crate) fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Credential directory for a tenant: `{root}/{tenant}`
pub fn credential_dir(root: &Path, tenant: &TenantId) -> PathBuf {
    root.join(tenant.as_str())
}
