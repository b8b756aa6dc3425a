//! Per-connection and per-request context.
//!
//! A [`ConnectionContext`] is created when a transport connection is
//! accepted: it carries a short correlation id and a tracing span that every
//! log line for requests on that connection is emitted under. The request
//! wrapper derives a [`RequestContext`] from it by adding the request
//! deadline, and hands it to the handler by value.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::ApiError;
use tokio::time::Instant;
use tracing::Span;

/// Length of the per-connection correlation id.
pub const CORRELATION_ID_LEN: usize = 8;

/// Generate a short correlation id. Safe to call from any task.
pub fn correlation_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(CORRELATION_ID_LEN);
    id
}

/// Context attached to every request arriving on one transport connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    id: Arc<str>,
    span: Span,
}

impl ConnectionContext {
    /// Context for an accepted connection.
    pub fn new(remote: Option<SocketAddr>, local: Option<SocketAddr>) -> Self {
        let id: Arc<str> = correlation_id().into();
        let span = tracing::info_span!("conn", req = %id);
        tracing::debug!(
            parent: &span,
            remote = ?remote,
            local = ?local,
            "new HTTP connection"
        );
        Self { id, span }
    }

    /// Context for a request that did not arrive through the accept loop,
    /// e.g. a router driven directly in tests.
    pub fn detached() -> Self {
        let id: Arc<str> = correlation_id().into();
        let span = tracing::info_span!("conn", req = %id);
        Self { id, span }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Request-scoped context handed to every business handler.
///
/// The deadline is advisory: nothing aborts a handler that overruns it.
/// Handlers must observe it themselves, typically by running their blocking
/// work through [`RequestContext::bounded`]. Ignoring the deadline is a bug in
/// the handler. Work spawned to outlive the request must not capture this
/// context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    connection: ConnectionContext,
    deadline: Instant,
}

impl RequestContext {
    /// Derive a request context whose deadline is `timeout` from now.
    pub fn new(connection: ConnectionContext, timeout: Duration) -> Self {
        Self {
            connection,
            deadline: Instant::now() + timeout,
        }
    }

    /// Correlation id of the connection this request arrived on.
    pub fn correlation_id(&self) -> &str {
        self.connection.id()
    }

    /// Contextual logger span for this request.
    pub fn span(&self) -> &Span {
        self.connection.span()
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Run `fut` to completion unless the deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::DeadlineExceeded`] when the deadline wins; `fut`
    /// is dropped at that point.
    pub async fn bounded<F, T>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.deadline, fut)
            .await
            .map_err(|_| ApiError::DeadlineExceeded)
    }
}
