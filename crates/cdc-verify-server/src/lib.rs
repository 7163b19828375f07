//! cdc-verify server: JSON action endpoint and CLI over the verification flow.

pub mod actions;
pub mod config;
pub mod transport;
pub mod types;

pub use actions::ActionRegistry;
pub use config::{resolve_bind_addr, resolve_site_config, ConfigOverrides};
pub use transport::HttpTransport;
