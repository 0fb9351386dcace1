//! TLS material loading and connection configuration
//!
//! The controller presents one server identity on all three listeners and
//! asks peers for a client certificate without requiring one: a connection
//! with a CA-verified peer certificate is *authorized*, a connection without
//! one stays connected but unauthorized (not-yet-provisioned agents are
//! allowed to connect and be told so). Outbound connections (agents, the
//! websocket bridge's nested client) verify the controller against the
//! configured CA.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::TlsError;

/// A certificate chain plus private key, as loaded from PEM material
pub struct Identity {
    /// Certificate chain, leaf first
    pub certs: Vec<CertificateDer<'static>>,
    /// Private key
    pub key: PrivateKeyDer<'static>,
}

impl Identity {
    /// Load an identity from certificate and key files
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        Ok(Self {
            certs: load_certs(cert_path)?,
            key: load_key(key_path)?,
        })
    }

    /// Build an identity from in-memory PEM bytes.
    ///
    /// Used by the websocket bridge, where each browser session supplies its
    /// own credentials over the wire.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let certs = certs_from_pem(cert_pem)?;
        if certs.is_empty() {
            return Err(TlsError::InvalidPem("no certificates in PEM data".into()));
        }
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
            .map_err(|e| TlsError::InvalidPem(e.to_string()))?
            .ok_or(TlsError::NoPrivateKey)?;
        Ok(Self { certs, key })
    }

    /// Subject common name of the leaf certificate
    pub fn common_name(&self) -> Result<String, TlsError> {
        peer_common_name(&self.certs[0])
    }
}

/// Load all certificates from a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|e| TlsError::InvalidPem(e.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::InvalidPem(e.to_string()))?
        .ok_or(TlsError::NoPrivateKey)
}

/// Parse certificates out of in-memory PEM bytes
pub fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<_, _>>()
        .map_err(|e| TlsError::InvalidPem(e.to_string()))
}

/// Build a root store from CA certificate files
pub fn root_store(ca_paths: &[impl AsRef<Path>]) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for path in ca_paths {
        for cert in load_certs(path.as_ref())? {
            roots.add(cert)?;
        }
    }
    Ok(roots)
}

/// Server configuration with optional client-certificate authentication.
///
/// Peers presenting a certificate must present one the CA list verifies;
/// peers presenting none complete the handshake and are treated as
/// unauthorized at the protocol layer.
pub fn server_config(
    identity: Identity,
    ca_paths: &[impl AsRef<Path>],
) -> Result<ServerConfig, TlsError> {
    let roots = root_store(ca_paths)?;
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .map_err(|e| TlsError::Verifier(e.to_string()))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(identity.certs, identity.key)?;
    Ok(config)
}

/// Client configuration verifying the server against the CA list,
/// optionally presenting a client identity.
pub fn client_config(
    ca_paths: &[impl AsRef<Path>],
    identity: Option<Identity>,
) -> Result<ClientConfig, TlsError> {
    let roots = root_store(ca_paths)?;
    let builder = ClientConfig::builder().with_root_certificates(roots);

    let config = match identity {
        Some(identity) => builder.with_client_auth_cert(identity.certs, identity.key)?,
        None => builder.with_no_client_auth(),
    };
    Ok(config)
}

/// Extract the subject common name from a DER-encoded certificate
pub fn peer_common_name(cert: &CertificateDer<'_>) -> Result<String, TlsError> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|e| TlsError::CertificateParse(e.to_string()))?;

    let cn = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .ok_or(TlsError::NoCommonName);
    cn
}
