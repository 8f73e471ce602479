use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use rustls::{
    crypto::aws_lc_rs,
    pki_types::{CertificateDer, PrivateKeyDer},
    version::TLS13,
    CipherSuite, ServerConfig,
};

use crate::Error;

/// Loads a PEM certificate chain from `path`.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path).map_err(Error::Cert)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>().map_err(Error::Cert)
}

/// Loads the first PEM private key from `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let file = File::open(path).map_err(Error::Key)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader).map_err(Error::Key)?.ok_or(Error::NoKey)
}

/// Builds a server TLS configuration restricted to the single
/// `TLS_CHACHA20_POLY1305_SHA256` cipher suite (TLS 1.3 only).
///
/// The target ARM core has no AES acceleration, so constant-time ChaCha
/// outperforms a software AES-GCM fallback; narrowing the suite list
/// also means there's only one handshake path to reason about.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, Error> {
    let mut provider = aws_lc_rs::default_provider();
    provider.cipher_suites.retain(|suite| suite.suite() == CipherSuite::TLS13_CHACHA20_POLY1305_SHA256);

    ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&TLS13])
        .map_err(Error::TlsConfig)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(Error::TlsConfig)
}
