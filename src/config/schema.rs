//! Configuration schema for sessiond
//!
//! Configuration is stored at `~/.config/sessiond/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Session supervision settings
    pub sessions: SessionsConfig,

    /// Messaging transport settings
    pub transport: TransportConfig,

    /// Inbound message log
    pub inbox: InboxConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging of session lifecycle events
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,

    /// Allowed CORS origins (empty = permissive)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            cors_origins: vec![],
        }
    }
}

/// Session supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Root directory holding one credential directory per tenant
    /// (defaults to `<state_dir>/sessiond/sessions`)
    pub root: Option<PathBuf>,

    /// Fixed delay before reconnecting after an unexpected disconnect
    pub reconnect_delay_secs: u64,

    /// Upper bound on credential load plus transport handshake
    pub start_timeout_secs: u64,

    /// Upper bound on a single outbound send
    pub send_timeout_secs: u64,

    /// Upper bound on remote deauthorization during logout
    pub logout_timeout_secs: u64,

    /// Start an idle or disconnected session when a send arrives
    pub auto_start_on_send: bool,

    /// Country code prefixed to bare 10-digit numbers (empty = none)
    pub default_country_code: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: None,
            reconnect_delay_secs: 3,
            start_timeout_secs: 30,
            send_timeout_secs: 30,
            logout_timeout_secs: 5,
            auto_start_on_send: true,
            default_country_code: String::new(),
        }
    }
}

impl SessionsConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_secs(self.logout_timeout_secs)
    }

    /// Configured country code, if any
    pub fn country_code(&self) -> Option<&str> {
        let code = self.default_country_code.trim();
        (!code.is_empty()).then_some(code)
    }
}

/// Messaging transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport backend ("loopback" is the built-in simulated network)
    pub kind: String,

    /// Loopback only: seconds after the QR code before pairing completes
    /// on its own (0 = wait for an explicit pairing)
    pub auto_pair_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: "loopback".to_string(),
            auto_pair_secs: 5,
        }
    }
}

/// Inbound message log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    /// Persist inbound messages to `<state_dir>/inbox/{tenant}.jsonl`
    pub enabled: bool,

    /// Ignore group conversations
    pub skip_groups: bool,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_groups: true,
        }
    }
}
