//! CLI command implementations

pub mod config;
pub mod serve;
pub mod sessions;
pub mod status;

pub use config::execute as config;
pub use serve::execute as serve;
pub use sessions::execute as sessions;
pub use status::execute as status;
