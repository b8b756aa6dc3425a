//! End-to-end HTTPS and mutual TLS over a real socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apiserver::server::ServerError;
use apiserver::{routes, ApiServer, Config};
use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn certs(name: &str) -> Vec<CertificateDer<'static>> {
    let pem = std::fs::read(fixture(name)).unwrap();
    rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .unwrap()
}

fn key(name: &str) -> PrivateKeyDer<'static> {
    let pem = std::fs::read(fixture(name)).unwrap();
    rustls_pemfile::private_key(&mut pem.as_slice())
        .unwrap()
        .unwrap()
}

fn tls_config(client_auth: bool) -> Config {
    Config {
        http_address: "127.0.0.1".into(),
        http_port: 0,
        http_tls_enabled: true,
        http_tls_client_auth: client_auth,
        http_tls_ca_file: Some(fixture("ca.pem")),
        http_tls_cert_file: Some(fixture("server.pem")),
        http_tls_key_file: Some(fixture("server.key")),
        ..Config::default()
    }
}

async fn start(cfg: &Config) -> (SocketAddr, CancellationToken, JoinHandle<Result<(), ServerError>>) {
    let server = ApiServer::new(cfg, &routes::table()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.serve(cancel.clone()));
    (addr, cancel, task)
}

fn connector(client_cert: Option<(&str, &str)>) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for cert in certs("ca.pem") {
        roots.add(cert).unwrap();
    }
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(roots);

    let config = match client_cert {
        Some((cert, k)) => builder.with_client_auth_cert(certs(cert), key(k)).unwrap(),
        None => builder.with_no_client_auth(),
    };
    TlsConnector::from(Arc::new(config))
}

/// GET the status route over TLS, returning the response status or the
/// first transport error.
async fn get_status(addr: SocketAddr, connector: TlsConnector) -> Result<StatusCode, String> {
    let tcp = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
    let name = ServerName::try_from("localhost").unwrap();
    let tls = connector
        .connect(name, tcp)
        .await
        .map_err(|e| e.to_string())?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls))
        .await
        .map_err(|e| e.to_string())?;
    tokio::spawn(conn);

    let req = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/v1/status")
        .header(header::HOST, "localhost")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::empty())
        .unwrap();
    let resp = sender.send_request(req).await.map_err(|e| e.to_string())?;
    Ok(resp.status())
}

async fn stop(cancel: CancellationToken, task: JoinHandle<Result<(), ServerError>>) {
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn serves_https_without_client_auth() {
    let (addr, cancel, task) = start(&tls_config(false)).await;
    assert_eq!(get_status(addr, connector(None)).await, Ok(StatusCode::OK));
    stop(cancel, task).await;
}

#[tokio::test]
async fn mutual_tls_accepts_trusted_client() {
    let (addr, cancel, task) = start(&tls_config(true)).await;
    let status = get_status(addr, connector(Some(("client.pem", "client.key")))).await;
    assert_eq!(status, Ok(StatusCode::OK));
    stop(cancel, task).await;
}

#[tokio::test]
async fn mutual_tls_rejects_missing_client_cert() {
    let (addr, cancel, task) = start(&tls_config(true)).await;
    assert!(get_status(addr, connector(None)).await.is_err());
    stop(cancel, task).await;
}

#[tokio::test]
async fn mutual_tls_rejects_untrusted_client_cert() {
    let (addr, cancel, task) = start(&tls_config(true)).await;
    let status = get_status(addr, connector(Some(("rogue.pem", "client.key")))).await;
    assert!(status.is_err());
    stop(cancel, task).await;
}

#[tokio::test]
async fn ca_file_without_certificates_fails_startup() {
    let cfg = Config {
        http_tls_ca_file: Some(fixture("server.key")),
        ..tls_config(true)
    };
    let err = ApiServer::new(&cfg, &routes::table()).await.err().unwrap();
    assert!(matches!(err, ServerError::InvalidCaFile { .. }));
}

#[tokio::test]
async fn missing_certificate_file_fails_startup() {
    let cfg = Config {
        http_tls_cert_file: Some(fixture("does-not-exist.pem")),
        ..tls_config(false)
    };
    let err = ApiServer::new(&cfg, &routes::table()).await.err().unwrap();
    assert!(matches!(err, ServerError::TlsConfig(_)));
}
