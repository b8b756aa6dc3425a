//! Startup-class errors. Any of these aborts bootstrap; none are retried.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("unable to start listener on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded or rustls rejected the configuration.
    #[error("TLS configuration failed: {0}")]
    TlsConfig(String),

    /// The CA bundle was empty or contained no usable certificates.
    #[error("invalid CA file {}: no valid certificates found", path.display())]
    InvalidCaFile { path: PathBuf },

    /// A declared route could not be registered.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The accept loop failed in a way that ends serving.
    #[error("listener accept failed: {0}")]
    Accept(#[source] std::io::Error),
}

impl ServerError {
    pub(crate) fn tls(context: &str, err: impl std::fmt::Display) -> Self {
        ServerError::TlsConfig(format!("{context}: {err}"))
    }
}

/// Route table problems detected while building the router.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The router cannot match on this method.
    #[error("unsupported method {method} for route {path}")]
    UnsupportedMethod { method: String, path: String },

    /// Route paths must be absolute.
    #[error("route path {0:?} must start with '/'")]
    InvalidPath(String),

    /// The same method and path were declared twice.
    #[error("duplicate route {method} {path}")]
    Duplicate { method: String, path: String },
}
