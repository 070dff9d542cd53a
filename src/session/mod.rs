//! Per-tenant messaging session management

pub mod events;
mod reconnect;
pub mod registry;
pub mod state;
pub mod supervisor;

pub use events::{EventHandler, SessionEvent, Subscription};
pub use registry::SessionRegistry;
pub use state::{SessionSnapshot, SessionState};
pub use supervisor::{Supervisor, SupervisorSettings};
