//! Request-class error taxonomy shared across crates.

use thiserror::Error;

/// Error produced while processing a single API request.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ApiError::Decode`] → 400
/// - [`ApiError::NotFound`] → 404
/// - [`ApiError::Handler`] → status chosen by the handler
/// - [`ApiError::ResponseMarshal`] → 500
/// - [`ApiError::DeadlineExceeded`] → 504
///
/// None of these ever escape the request pipeline; they are rendered as a
/// [`RestError`](crate::protocol::RestError) body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body could not be read or parsed as the route's input type.
    #[error("{0}")]
    Decode(String),

    /// No route matched the request path, method and content type.
    #[error("Not found")]
    NotFound,

    /// A business handler rejected the request with its own status code.
    #[error("{message}")]
    Handler {
        /// Status code reported by the handler.
        status: u16,
        /// Human-readable description safe to expose to callers.
        message: String,
    },

    /// The handler's output could not be serialised to JSON.
    #[error("failed to serialise response: {0}")]
    ResponseMarshal(String),

    /// The per-request deadline elapsed before the handler's work completed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl ApiError {
    /// Construct a handler error with an explicit status code.
    pub fn handler(status: u16, message: impl Into<String>) -> Self {
        ApiError::Handler {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a handler-reported 400.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::handler(400, message)
    }

    /// Returns the HTTP status code associated with this error, as reported.
    ///
    /// The request wrapper clamps anything below 300 to 500 before sending.
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::Decode(_) => 400,
            ApiError::NotFound => 404,
            ApiError::Handler { status, .. } => *status,
            ApiError::ResponseMarshal(_) => 500,
            ApiError::DeadlineExceeded => 504,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ApiError::Decode("x".into()).http_status(), 400);
        assert_eq!(ApiError::NotFound.http_status(), 404);
        assert_eq!(ApiError::handler(409, "conflict").http_status(), 409);
        assert_eq!(ApiError::ResponseMarshal("x".into()).http_status(), 500);
        assert_eq!(ApiError::DeadlineExceeded.http_status(), 504);
    }

    #[test]
    fn handler_status_is_reported_unclamped() {
        // Clamping is the request wrapper's job, not the error's.
        assert_eq!(ApiError::handler(200, "oops").http_status(), 200);
    }

    #[test]
    fn display_is_the_client_message() {
        let e = ApiError::bad_request("name must not be empty");
        assert_eq!(e.to_string(), "name must not be empty");
        assert_eq!(ApiError::NotFound.to_string(), "Not found");
    }

    #[test]
    fn json_errors_become_decode_errors() {
        let err = serde_json::from_str::<serde_json::Value>("not-json").unwrap_err();
        let api: ApiError = err.into();
        assert!(matches!(api, ApiError::Decode(ref m) if m.contains("expected")));
        assert_eq!(api.http_status(), 400);
    }
}
