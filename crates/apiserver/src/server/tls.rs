//! TLS policy: trust roots, client-certificate requirement, and a diagnostic
//! hook over verified client certificates.
//!
//! Trust roots come from a PEM CA bundle when one is configured, otherwise
//! from the bundled Mozilla root store. Chain verification is rustls/webpki's
//! job; the [`InspectingVerifier`] only logs what it has been handed after
//! that verification succeeded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use tracing::{debug, info};

use super::error::ServerError;

/// Inputs to [`build_server_config`].
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// Require and verify client certificates.
    pub client_auth: bool,
    /// PEM bundle of trusted CAs; `None` selects the default trust store.
    pub ca_file: Option<PathBuf>,
    /// PEM certificate chain served to clients.
    pub cert_file: PathBuf,
    /// PEM private key for `cert_file`.
    pub key_file: PathBuf,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a [`rustls::ServerConfig`] from the configured files.
///
/// # Errors
///
/// - [`ServerError::InvalidCaFile`] if the CA bundle holds no usable certificate.
/// - [`ServerError::TlsConfig`] if any file cannot be read, the certificate or
///   key cannot be parsed, the default trust store is empty, or rustls rejects
///   the configuration.
pub fn build_server_config(settings: &TlsSettings) -> Result<Arc<ServerConfig>, ServerError> {
    let roots = load_trust_roots(settings.ca_file.as_deref())?;
    let cert_pem = std::fs::read(&settings.cert_file)
        .map_err(|e| ServerError::tls(&format!("reading {}", settings.cert_file.display()), e))?;
    let key_pem = std::fs::read(&settings.key_file)
        .map_err(|e| ServerError::tls(&format!("reading {}", settings.key_file.display()), e))?;
    build_from_pem(&cert_pem, &key_pem, roots, settings.client_auth)
}

/// Load the trust roots used to verify client certificates.
///
/// # Errors
///
/// See [`build_server_config`].
pub fn load_trust_roots(ca_file: Option<&Path>) -> Result<RootCertStore, ServerError> {
    match ca_file {
        Some(path) => {
            let pem = std::fs::read(path)
                .map_err(|e| ServerError::tls(&format!("reading {}", path.display()), e))?;
            parse_ca_bundle(&pem, path)
        }
        None => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            if roots.is_empty() {
                return Err(ServerError::TlsConfig("default trust store is empty".into()));
            }
            Ok(roots)
        }
    }
}

/// Parse a PEM CA bundle. `path` is only used for error reporting.
pub fn parse_ca_bundle(pem: &[u8], path: &Path) -> Result<RootCertStore, ServerError> {
    let invalid = || ServerError::InvalidCaFile {
        path: path.to_path_buf(),
    };
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(invalid());
    }
    debug!(added, ignored, path = %path.display(), "loaded CA bundle");
    Ok(roots)
}

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and key bytes.
pub fn build_from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
    roots: RootCertStore,
    client_auth: bool,
) -> Result<Arc<ServerConfig>, ServerError> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls("failed to parse TLS certificate chain", e))?;
    if certs.is_empty() {
        return Err(ServerError::TlsConfig("no certificate found in PEM data".into()));
    }

    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
            .map_err(|e| ServerError::tls("failed to read TLS private key", e))?
            .ok_or_else(|| ServerError::TlsConfig("no private key found in PEM data".into()))?;

    let builder = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::tls("unsupported protocol versions", e))?;

    let builder = if client_auth {
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
            .build()
            .map_err(|e| ServerError::tls("failed to build client verifier", e))?;
        builder.with_client_cert_verifier(Arc::new(InspectingVerifier::new(verifier)))
    } else {
        builder.with_no_client_auth()
    };

    let mut config = builder
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls("failed to build rustls ServerConfig", e))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    info!(client_auth, "TLS configuration ready");
    Ok(Arc::new(config))
}

// ---------------------------------------------------------------------------
// Peer certificate inspection
// ---------------------------------------------------------------------------

/// Client verifier that delegates every decision to webpki and logs the
/// subject, issuer and expiry of each certificate it accepted.
pub struct InspectingVerifier {
    inner: Arc<dyn ClientCertVerifier>,
}

impl InspectingVerifier {
    pub fn new(inner: Arc<dyn ClientCertVerifier>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for InspectingVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InspectingVerifier").finish_non_exhaustive()
    }
}

/// Log a verified client certificate. Parse failures are logged, never raised.
fn inspect_peer_certificate(cert: &CertificateDer<'_>) {
    match x509_parser::parse_x509_certificate(cert.as_ref()) {
        Ok((_, parsed)) => debug!(
            subject = %parsed.subject(),
            issuer = %parsed.issuer(),
            expiry = %parsed.validity().not_after,
            "client certificate provided"
        ),
        Err(e) => debug!(error = %e, "client certificate provided but could not be parsed"),
    }
}

impl ClientCertVerifier for InspectingVerifier {
    fn offer_client_auth(&self) -> bool {
        self.inner.offer_client_auth()
    }

    fn client_auth_mandatory(&self) -> bool {
        self.inner.client_auth_mandatory()
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let verified = self.inner.verify_client_cert(end_entity, intermediates, now)?;
        inspect_peer_certificate(end_entity);
        Ok(verified)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA_PEM: &[u8] = include_bytes!("../../tests/fixtures/ca.pem");
    const SERVER_PEM: &[u8] = include_bytes!("../../tests/fixtures/server.pem");
    const SERVER_KEY: &[u8] = include_bytes!("../../tests/fixtures/server.key");
    const CLIENT_PEM: &[u8] = include_bytes!("../../tests/fixtures/client.pem");
    const ROGUE_PEM: &[u8] = include_bytes!("../../tests/fixtures/rogue.pem");

    fn ca_roots() -> RootCertStore {
        parse_ca_bundle(CA_PEM, Path::new("ca.pem")).unwrap()
    }

    fn first_cert(pem: &[u8]) -> CertificateDer<'static> {
        rustls_pemfile::certs(&mut std::io::BufReader::new(pem))
            .next()
            .unwrap()
            .unwrap()
    }

    fn inspecting_verifier() -> InspectingVerifier {
        let inner = WebPkiClientVerifier::builder_with_provider(Arc::new(ca_roots()), provider())
            .build()
            .unwrap();
        InspectingVerifier::new(inner)
    }

    #[test]
    fn rejects_empty_ca_bundle() {
        let err = parse_ca_bundle(b"", Path::new("empty.pem")).unwrap_err();
        assert!(matches!(err, ServerError::InvalidCaFile { .. }));
    }

    #[test]
    fn rejects_garbage_ca_bundle() {
        let err = parse_ca_bundle(b"not a pem", Path::new("garbage.pem")).unwrap_err();
        assert!(matches!(err, ServerError::InvalidCaFile { .. }));
    }

    #[test]
    fn missing_ca_file_is_tls_config_error() {
        let err = load_trust_roots(Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(matches!(err, ServerError::TlsConfig(_)));
    }

    #[test]
    fn default_trust_store_is_populated() {
        assert!(!load_trust_roots(None).unwrap().is_empty());
    }

    #[test]
    fn parses_ca_bundle() {
        assert_eq!(ca_roots().len(), 1);
    }

    #[test]
    fn rejects_empty_cert_pem() {
        let result = build_from_pem(b"", b"", ca_roots(), false);
        assert!(matches!(result, Err(ServerError::TlsConfig(_))));
    }

    #[test]
    fn rejects_garbage_key_pem() {
        let result = build_from_pem(SERVER_PEM, b"also not a pem", ca_roots(), false);
        assert!(matches!(result, Err(ServerError::TlsConfig(_))));
    }

    #[test]
    fn builds_with_and_without_client_auth() {
        let plain = build_from_pem(SERVER_PEM, SERVER_KEY, ca_roots(), false).unwrap();
        assert!(plain.alpn_protocols.contains(&b"h2".to_vec()));
        build_from_pem(SERVER_PEM, SERVER_KEY, ca_roots(), true).unwrap();
    }

    #[test]
    fn inspecting_verifier_accepts_ca_signed_client() {
        let verifier = inspecting_verifier();
        assert!(verifier.client_auth_mandatory());
        verifier
            .verify_client_cert(&first_cert(CLIENT_PEM), &[], UnixTime::now())
            .unwrap();
    }

    #[test]
    fn chain_verification_still_rejects_unknown_issuer() {
        let verifier = inspecting_verifier();
        let result = verifier.verify_client_cert(&first_cert(ROGUE_PEM), &[], UnixTime::now());
        assert!(result.is_err());
    }

    #[test]
    fn inspection_never_panics_on_garbage() {
        inspect_peer_certificate(&CertificateDer::from(vec![0u8; 8]));
    }

    #[test]
    fn build_server_config_reports_invalid_ca_file_before_reading_certs() {
        let settings = TlsSettings {
            client_auth: true,
            ca_file: Some(std::env::temp_dir().join("apiserver-empty-ca.pem")),
            cert_file: "/nonexistent/server.pem".into(),
            key_file: "/nonexistent/server.key".into(),
        };
        std::fs::write(settings.ca_file.as_ref().unwrap(), b"").unwrap();
        let err = build_server_config(&settings).unwrap_err();
        assert!(matches!(err, ServerError::InvalidCaFile { .. }));
    }
}
