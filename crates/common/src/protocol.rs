//! Wire-level types shared by the server and its clients.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Media type carried by every request to a JSON route and every response.
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Error envelope returned on any 4xx/5xx status.
///
/// Holds only the human-readable message; internal detail stays in the
/// server-side logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestError {
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl RestError {
    /// Construct a [`RestError`] from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&ApiError> for RestError {
    fn from(err: &ApiError) -> Self {
        Self::new(err.to_string())
    }
}
