//! Transport layer for the action server.

pub mod http;

pub use http::{router, HttpTransport, ServerState};
