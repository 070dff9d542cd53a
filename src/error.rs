//! Error types for sessiond
//!
//! All modules use `SessiondResult<T>` as their return type.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sessiond operations
pub type SessiondResult<T> = Result<T, SessiondError>;

/// All errors that can occur in sessiond
#[derive(Error, Debug)]
pub enum SessiondError {
    // Request validation errors
    #[error("Invalid tenant id {id:?}: {reason}")]
    InvalidTenant { id: String, reason: String },

    #[error("Invalid recipient address: {0:?}")]
    InvalidAddress(String),

    #[error("Message text must not be empty")]
    EmptyMessage,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Malformed request: {0}")]
    BadRequest(String),

    // Session errors
    #[error("Session for tenant {0} is not connected")]
    NotConnected(String),

    #[error("Transport handshake failed for tenant {tenant}: {reason}")]
    TransportHandshake { tenant: String, reason: String },

    #[error("Transport send failed for tenant {tenant}: {reason}")]
    TransportSend { tenant: String, reason: String },

    #[error("Remote logout failed for tenant {tenant}, local state cleared: {reason}")]
    LogoutPartialFailure { tenant: String, reason: String },

    #[error("{operation} timed out after {secs}s for tenant {tenant}")]
    Timeout {
        operation: &'static str,
        tenant: String,
        secs: u64,
    },

    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    // Credential errors
    #[error("Credential store error for tenant {tenant}: {context}")]
    CredentialStore {
        tenant: String,
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Client errors (CLI talking to a running server)
    #[error("HTTP request failed: {0}")]
    Http(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SessiondError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a credential store error for a tenant
    pub fn store(
        tenant: impl Into<String>,
        context: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::CredentialStore {
            tenant: tenant.into(),
            context: context.into(),
            source,
        }
    }

    /// Create a handshake error
    pub fn handshake(tenant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportHandshake {
            tenant: tenant.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the caller's input rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTenant { .. }
                | Self::InvalidAddress(_)
                | Self::EmptyMessage
                | Self::MissingField(_)
                | Self::BadRequest(_)
        )
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportHandshake { .. }
                | Self::TransportSend { .. }
                | Self::NotConnected(_)
                | Self::Timeout { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotConnected(_) => Some("Start the session and scan the QR code first"),
            Self::InvalidTenant { .. } => {
                Some("Tenant ids may only contain letters, digits, '-' and '_'")
            }
            Self::ConfigInvalid { .. } => Some("Run: sessiond config show"),
            Self::UnsupportedTransport(_) => Some("Set transport.kind = \"loopback\""),
            Self::Http(_) => Some("Is the server running? Start it with: sessiond serve"),
            _ => None,
        }
    }
}
