//! Races external cancellation against the server ending on its own.
//!
//! Whichever happens first decides the outcome. Cancellation closes the
//! server through its [`ServerHandle`]; a natural end leaves the handle alone.
//! The handle guarantees the close action runs at most once no matter how
//! many paths reach it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cloneable handle used to stop a running server.
#[derive(Debug, Clone, Default)]
pub struct ServerHandle {
    closed: CancellationToken,
    close_once: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to stop accepting and drain.
    ///
    /// Returns `true` only for the call that actually performed the close.
    pub fn close(&self) -> bool {
        if self.close_once.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!("closing API server");
        self.closed.cancel();
        true
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

/// Which side of the race stopped the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// External cancellation fired first; the server was closed.
    Cancelled,
    /// The serve loop ended first, cleanly or with an error.
    ServerEnded,
}

/// Supervises one serve run.
///
/// Created with [`start`](Self::start) just before the serve loop begins and
/// consumed with [`finish`](Self::finish) once it returns.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    ended: CancellationToken,
    supervisor: JoinHandle<ShutdownCause>,
}

impl ShutdownCoordinator {
    /// Start watching `cancel` on behalf of the server behind `handle`.
    pub fn start(cancel: CancellationToken, handle: ServerHandle) -> Self {
        let ended = CancellationToken::new();
        let server_ended = ended.clone();
        let supervisor = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = server_ended.cancelled() => ShutdownCause::ServerEnded,
                _ = cancel.cancelled() => {
                    info!("API server context cancelled - shutting down");
                    handle.close();
                    ShutdownCause::Cancelled
                }
            }
        });
        Self { ended, supervisor }
    }

    /// Report that the serve loop has returned and wait for the supervisor.
    ///
    /// Cancellation arriving after this point has no effect.
    pub async fn finish(self) -> ShutdownCause {
        self.ended.cancel();
        // The supervisor never panics; treat a join failure as a natural end.
        self.supervisor.await.unwrap_or(ShutdownCause::ServerEnded)
    }
}
