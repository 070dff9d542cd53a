//! Session state and the status snapshot served to callers

use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};

/// Connection lifecycle state of one tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Never started in this process
    Idle,
    /// Loading credentials or waiting on the transport
    Connecting,
    /// A QR code was issued and is waiting to be scanned
    #[serde(rename = "AwaitingQRScan")]
    AwaitingQrScan,
    Connected,
    /// Lost the connection; a reconnect is pending unless stopped
    Disconnected,
    /// Deauthorized; credentials were wiped
    LoggedOut,
}

impl SessionState {
    /// States in which a send may start the session first
    pub fn can_auto_start(self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::AwaitingQrScan => "AwaitingQRScan",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::LoggedOut => "LoggedOut",
        }
    }
}

/// Point-in-time view of a tenant's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub tenant_id: TenantId,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_qr_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_identity: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot of a tenant that has no supervisor yet
    pub fn idle(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            state: SessionState::Idle,
            last_qr_payload: None,
            connected_identity: None,
        }
    }
}
