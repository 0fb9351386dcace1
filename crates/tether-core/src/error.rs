//! Core error types for tether

use std::path::PathBuf;
use thiserror::Error;

use tether_protocol::ProtocolError;

/// Top-level error type for the tether ecosystem
#[derive(Error, Debug)]
pub enum CoreError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// TLS material and handshake configuration errors.
///
/// These are startup-time failures and fatal by design: a controller or
/// agent with unreadable certificate material must not come up.
#[derive(Error, Debug)]
pub enum TlsError {
    /// Certificate file could not be read
    #[error("Cannot read certificate material at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// PEM file contained no certificates
    #[error("No certificates found in {0}")]
    NoCertificate(PathBuf),

    /// PEM data contained no private key
    #[error("No private key found")]
    NoPrivateKey,

    /// PEM parse error
    #[error("Invalid PEM data: {0}")]
    InvalidPem(String),

    /// Certificate could not be parsed for inspection
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// Certificate has no subject common name
    #[error("Certificate has no common name")]
    NoCommonName,

    /// rustls configuration error
    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    /// Host name not usable for server name verification
    #[error("Invalid server name: {0}")]
    ServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Client certificate verifier could not be built
    #[error("Client verifier error: {0}")]
    Verifier(String),
}
