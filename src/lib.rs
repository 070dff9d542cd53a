//! sessiond - multi-tenant messaging session supervisor
//!
//! Keeps one supervised, auto-reconnecting messaging session per tenant,
//! persists each tenant's pairing credentials, and exposes QR pairing,
//! status, send and logout over HTTP.

pub mod address;
pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod journal;
pub mod session;
pub mod tenant;
pub mod transport;
pub mod ui;

pub use error::{SessiondError, SessiondResult};
