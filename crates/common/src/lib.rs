//! Shared wire types and request errors for the JSON API server crates.

pub mod error;
pub mod protocol;

pub use error::ApiError;
pub use protocol::{RestError, JSON_CONTENT_TYPE};
