//! TLS credential loading, grounded in `salvo_core::conn::rustls::Keycert`
//! (PEM-from-path / PEM-from-bytes builder) and in the self-signed /
//! pinned-trust `ServerConfig`/`ClientConfig` construction from
//! `hdds`'s QUIC transport (`build_tls_configs`, `trusted_client_config`,
//! `insecure_client_config`). `h3lib-core` itself never touches a
//! certificate (spec.md §1 "non-goals... TLS certificate validation
//! policy") — this module is entirely `h3lib-quinn`'s concern.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

/// H3's registered ALPN identifier (RFC 9114 §3.1).
pub const ALPN_H3: &[u8] = b"h3";

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {0:?}: {1}")]
    Io(std::path::PathBuf, std::io::Error),
    #[error("no certificate found in PEM input")]
    NoCertificate,
    #[error("no private key found in PEM input")]
    NoPrivateKey,
    #[error("rustls config error: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("self-signed certificate generation failed: {0}")]
    SelfSigned(#[from] rcgen::Error),
}

/// A certificate chain plus its private key, in PEM or DER form. Named
/// and shaped after `salvo_core::conn::rustls::Keycert`: builder methods
/// that load from a path or accept raw bytes, kept separate from turning
/// them into a rustls config so callers can inspect/clone the credential.
#[derive(Clone, Debug, Default)]
pub struct Keycert {
    key: Vec<u8>,
    cert: Vec<u8>,
}

impl Keycert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_from_path(mut self, path: impl AsRef<Path>) -> Result<Self, TlsError> {
        self.key = read_file(path)?;
        Ok(self)
    }

    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn cert_from_path(mut self, path: impl AsRef<Path>) -> Result<Self, TlsError> {
        self.cert = read_file(path)?;
        Ok(self)
    }

    pub fn cert(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.cert = cert.into();
        self
    }

    /// Generate an ephemeral self-signed certificate for `subject_alt_names`
    /// (e.g. `["localhost"]`) — useful for local development and the
    /// crate's own integration tests; never for production use.
    pub fn self_signed(subject_alt_names: Vec<String>) -> Result<Self, TlsError> {
        let generated = rcgen::generate_simple_self_signed(subject_alt_names)?;
        Ok(Self { key: generated.key_pair.serialize_pem().into_bytes(), cert: generated.cert.pem().into_bytes() })
    }

    fn parsed(&self) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
        let cert_chain: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut BufReader::new(self.cert.as_slice())).filter_map(|r| r.ok()).collect();
        if cert_chain.is_empty() {
            return Err(TlsError::NoCertificate);
        }
        let key = rustls_pemfile::private_key(&mut BufReader::new(self.key.as_slice()))
            .ok()
            .flatten()
            .ok_or(TlsError::NoPrivateKey)?;
        Ok((cert_chain, key))
    }
}

fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, TlsError> {
    let path = path.as_ref();
    let mut buf = Vec::new();
    File::open(path).and_then(|mut f| f.read_to_end(&mut buf)).map_err(|e| TlsError::Io(path.to_owned(), e))?;
    Ok(buf)
}

/// Build a `quinn::ServerConfig` that presents `keycert` and speaks only
/// `h3` over ALPN (spec.md §1 "delegates [TLS] to the transport" — the
/// engine never sees this).
pub fn server_config(keycert: &Keycert) -> Result<quinn::ServerConfig, TlsError> {
    let (cert_chain, key) = keycert.parsed()?;
    let mut crypto = rustls::ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    crypto.alpn_protocols = vec![ALPN_H3.to_vec()];
    let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(crypto)
        .map_err(|e| TlsError::Rustls(rustls::Error::General(e.to_string())))?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic_crypto)))
}

/// Build a `quinn::ClientConfig` that trusts exactly the certificates in
/// `trusted`, i.e. certificate pinning rather than a public CA root store
/// — appropriate for talking to a server built from [`server_config`]
/// with a self-signed cert (grounded in `hdds`'s `trusted_client_config`).
pub fn client_config(trusted: &[Keycert]) -> Result<quinn::ClientConfig, TlsError> {
    let mut roots = rustls::RootCertStore::empty();
    for keycert in trusted {
        let (chain, _) = keycert.parsed()?;
        for cert in chain {
            roots.add(cert).map_err(TlsError::Rustls)?;
        }
    }
    let mut crypto = rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN_H3.to_vec()];
    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TlsError::Rustls(rustls::Error::General(e.to_string())))?;
    Ok(quinn::ClientConfig::new(Arc::new(quic_crypto)))
}

/// A `quinn::ClientConfig` that skips server certificate verification
/// entirely. Only for local testing against a self-signed server — never
/// pass this to a client that talks to anything on a real network.
pub fn insecure_client_config() -> quinn::ClientConfig {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoServerVerification))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN_H3.to_vec()];
    let quic_crypto =
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto).expect("rustls ClientConfig is always valid QUIC crypto");
    quinn::ClientConfig::new(Arc::new(quic_crypto))
}

#[derive(Debug)]
struct NoServerVerification;

impl rustls::client::danger::ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
    }
}
