//! Handlers for the actions accepted by `POST /api/cdc`.

pub mod fetch_captcha;
pub mod init_session;
pub mod registry;
pub mod scrape_details;
pub mod submit_search;
pub mod submit_verification;

pub use registry::ActionRegistry;
