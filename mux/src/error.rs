use std::io;

/// Errors surfaced by the TLS/HTTP/WebSocket multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The certificate file couldn't be read or parsed.
    #[error("failed to load TLS certificate: {0}")]
    Cert(#[source] io::Error),
    /// The private key file couldn't be read or parsed.
    #[error("failed to load TLS private key: {0}")]
    Key(#[source] io::Error),
    /// The key file parsed but contained no usable private key.
    #[error("no private key found in key file")]
    NoKey,
    /// rustls rejected the assembled server configuration.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(#[source] rustls::Error),
    /// The TLS handshake with a client failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
    /// A client sent a malformed handshake, oversize frame, or bad JSON.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The peer closed the connection or the socket broke mid-write.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
}
