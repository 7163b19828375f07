//! Server-side types: errors and action metadata.

pub mod action;
pub mod error;

pub use action::*;
pub use error::*;
