//! The HTTP(S) server: listener, TLS, routing, request wrapping and shutdown.
//!
//! # Responsibilities
//! - Build the router from a [`RouteTable`], then the TLS policy, then bind.
//! - Accept connections, attach a [`ConnectionContext`] to each, and serve it
//!   with hyper under the configured read and write timeouts.
//! - Stop on external cancellation, draining in-flight requests.

pub mod context;
pub mod error;
pub mod handlers;
pub mod json;
pub mod listener;
pub mod middleware;
pub mod route;
pub mod router;
pub mod shutdown;
pub mod stream;
#[cfg(test)]
mod testing;
pub mod tls;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::Config;

pub use context::{ConnectionContext, RequestContext};
pub use error::{RouteError, ServerError};
pub use json::HandlerResult;
pub use route::{Route, RouteTable};
pub use shutdown::{ServerHandle, ShutdownCause, ShutdownCoordinator};

use router::RouterSettings;
use stream::{RawStream, TimedStream};
use tls::TlsSettings;

/// A fully assembled server, bound and ready to serve.
pub struct ApiServer {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    router: Router,
    handle: ServerHandle,
    read_timeout: Duration,
    write_timeout: Duration,
    shutdown_drain: Duration,
}

impl ApiServer {
    /// Assemble the server for `routes`.
    ///
    /// The router and TLS policy are built before the socket is bound, so a
    /// configuration error never leaves a port held.
    ///
    /// # Errors
    ///
    /// Returns the first [`ServerError`] raised by route registration, TLS
    /// policy construction or binding.
    pub async fn new(cfg: &Config, routes: &RouteTable) -> Result<Self, ServerError> {
        let router = router::build(routes, &RouterSettings::from(cfg))?;

        let tls = if cfg.http_tls_enabled {
            let settings = tls_settings(cfg)?;
            Some(TlsAcceptor::from(tls::build_server_config(&settings)?))
        } else {
            None
        };

        let listener = listener::create_listener(&cfg.http_address, cfg.http_port).await?;

        Ok(Self {
            listener,
            tls,
            router,
            handle: ServerHandle::new(),
            read_timeout: cfg.read_timeout(),
            write_timeout: cfg.write_timeout(),
            shutdown_drain: cfg.shutdown_drain(),
        })
    }

    /// Address the listener is bound to; reports the real port when the
    /// configured port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops this server when closed.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Serve until `cancel` fires or the accept loop fails.
    ///
    /// Returns `Ok(())` when the server stopped because it was closed, and
    /// the accept error otherwise.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let coordinator = ShutdownCoordinator::start(cancel, self.handle.clone());
        let result = self.run().await;
        let cause = coordinator.finish().await;
        debug!(?cause, "API server stopped");
        info!("API server complete");
        result
    }

    async fn run(self) -> Result<(), ServerError> {
        let tracker = TaskTracker::new();
        let draining = CancellationToken::new();

        let result = loop {
            let (tcp, remote) = tokio::select! {
                biased;
                _ = self.handle.closed() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) if is_connection_error(&e) => {
                        debug!(error = %e, "accept failed; continuing");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "listener failed");
                        break Err(ServerError::Accept(e));
                    }
                }
            };

            tracker.spawn(serve_connection(
                tcp,
                remote,
                self.tls.clone(),
                self.router.clone(),
                Timeouts {
                    read: self.read_timeout,
                    write: self.write_timeout,
                },
                draining.clone(),
            ));
        };

        drop(self.listener);
        tracker.close();
        draining.cancel();
        if tokio::time::timeout(self.shutdown_drain, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                open = tracker.len(),
                "connections still open after drain timeout"
            );
        }
        result
    }
}

/// Assemble and run a server for `routes` until `cancel` fires.
///
/// # Errors
///
/// See [`ApiServer::new`] and [`ApiServer::serve`].
pub async fn serve(
    cfg: &Config,
    routes: &RouteTable,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    ApiServer::new(cfg, routes).await?.serve(cancel).await
}

fn tls_settings(cfg: &Config) -> Result<TlsSettings, ServerError> {
    let cert_file = cfg
        .http_tls_cert_file
        .clone()
        .ok_or_else(|| ServerError::TlsConfig("no certificate file configured".into()))?;
    let key_file = cfg
        .http_tls_key_file
        .clone()
        .ok_or_else(|| ServerError::TlsConfig("no private key file configured".into()))?;
    Ok(TlsSettings {
        client_auth: cfg.http_tls_client_auth,
        ca_file: cfg.ca_file().map(|p| p.to_path_buf()),
        cert_file,
        key_file,
    })
}

/// Errors that affect only the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    read: Duration,
    write: Duration,
}

async fn serve_connection(
    tcp: TcpStream,
    remote: SocketAddr,
    tls: Option<TlsAcceptor>,
    router: Router,
    timeouts: Timeouts,
    draining: CancellationToken,
) {
    let connection = ConnectionContext::new(Some(remote), tcp.local_addr().ok());
    let span = connection.span().clone();

    async move {
        let raw = match tls {
            Some(acceptor) => {
                match tokio::time::timeout(timeouts.read, acceptor.accept(tcp)).await {
                    Ok(Ok(stream)) => RawStream::Tls(Box::new(stream)),
                    Ok(Err(e)) => {
                        debug!(error = %e, "TLS handshake failed");
                        return;
                    }
                    Err(_) => {
                        debug!("TLS handshake timed out");
                        return;
                    }
                }
            }
            None => RawStream::Tcp(tcp),
        };
        let io = TokioIo::new(TimedStream::new(raw, timeouts.write));

        let service = hyper::service::service_fn(move |mut req: hyper::Request<Incoming>| {
            req.extensions_mut().insert(connection.clone());
            router.clone().oneshot(req)
        });

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.read);
        let conn = builder.serve_connection_with_upgrades(io, service);
        tokio::pin!(conn);

        let drain = draining.cancelled();
        tokio::pin!(drain);
        let mut shutting_down = false;

        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        debug!(error = %e, "connection closed with error");
                    }
                    break;
                }
                _ = &mut drain, if !shutting_down => {
                    shutting_down = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
        debug!("HTTP connection closed");
    }
    .instrument(span)
    .await
}
