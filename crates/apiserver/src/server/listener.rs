//! TCP listener creation.

use tokio::net::TcpListener;
use tracing::info;

use super::error::ServerError;

/// Bind a TCP listener on `address:port`.
///
/// TLS and plaintext servers bind the same way; they differ only in how each
/// accepted stream is served.
///
/// # Errors
///
/// Returns [`ServerError::Listen`] carrying the attempted address when the
/// bind fails. This is fatal: the operator must fix the configuration or the
/// port conflict.
pub async fn create_listener(address: &str, port: u16) -> Result<TcpListener, ServerError> {
    let addr = format!("{address}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Listen {
            addr: addr.clone(),
            source,
        })?;

    match listener.local_addr() {
        Ok(bound) => info!(addr = %bound, "listening on HTTP {bound}"),
        Err(_) => info!(addr = %addr, "listening on HTTP {addr}"),
    }
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = create_listener("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn port_conflict_is_listen_error() {
        let first = create_listener("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = create_listener("127.0.0.1", port).await.unwrap_err();
        match err {
            ServerError::Listen { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{port}")),
            other => panic!("expected Listen error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolvable_address_is_listen_error() {
        let err = create_listener("not a host", 80).await.unwrap_err();
        assert!(matches!(err, ServerError::Listen { .. }));
    }
}
