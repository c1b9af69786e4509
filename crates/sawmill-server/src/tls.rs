//! TLS termination context
//!
//! Builds the rustls server configuration once from PEM certificate
//! material and hands out per-connection acceptors. Invalid material is a
//! startup error; per-connection handshake failures are handled by the
//! pipeline.

use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use sawmill_core::{TlsError, TlsSettings};

// ----------------------------------------------------------------------------
// TLS Context
// ----------------------------------------------------------------------------

/// Server-side TLS configuration shared by all connections
#[derive(Clone)]
pub struct TlsContext {
    server_config: Arc<rustls::ServerConfig>,
}

impl TlsContext {
    /// Build from PEM certificate chain and private key files
    pub fn from_settings(settings: &TlsSettings) -> Result<Self, TlsError> {
        let certs = CertificateDer::pem_file_iter(&settings.cert_path)
            .map_err(|e| TlsError::CertificateRead {
                path: settings.cert_path.display().to_string(),
                reason: e.to_string(),
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::InvalidCertificate {
                reason: e.to_string(),
            })?;

        if certs.is_empty() {
            return Err(TlsError::InvalidCertificate {
                reason: "no certificates found".into(),
            });
        }

        let key = PrivateKeyDer::from_pem_file(&settings.key_path).map_err(|e| {
            TlsError::InvalidPrivateKey {
                reason: e.to_string(),
            }
        })?;

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| TlsError::ServerConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            server_config: Arc::new(server_config),
        })
    }

    /// Acceptor for one inbound connection
    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.server_config))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
