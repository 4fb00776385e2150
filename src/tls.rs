//! Certificate loading and mTLS configuration for the job service.
//!
//! Both ends of the job service authenticate each other: the server requires
//! a client certificate signed by the configured CA, and clients verify the
//! server certificate against the same CA.

use std::path::PathBuf;

use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::config::TlsConfig;

/// TLS domain name presented by the server certificate and checked by clients.
pub const TLS_DOMAIN_NAME: &str = "job-worker";

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate path not configured")]
    MissingCaCert,

    #[error("Certificate path not configured")]
    MissingCert,

    #[error("Private key path not configured")]
    MissingKey,

    #[error("CA certificate not found: {0}")]
    CaCertNotFound(PathBuf),

    #[error("Certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("Private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Loaded TLS materials ready for use with tonic.
///
/// Holds this endpoint's identity (certificate + private key) and the CA
/// certificate used to verify the other side.
#[derive(Clone)]
pub struct TlsIdentity {
    identity: Identity,
    ca_cert: Certificate,
}

impl TlsIdentity {
    /// Load TLS materials from the paths in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if any required path is not configured, or any file
    /// does not exist or cannot be read.
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let ca_cert_path = config
            .ca_cert_path
            .as_ref()
            .ok_or(TlsError::MissingCaCert)?;
        let cert_path = config.cert_path.as_ref().ok_or(TlsError::MissingCert)?;
        let key_path = config.key_path.as_ref().ok_or(TlsError::MissingKey)?;

        if !ca_cert_path.exists() {
            return Err(TlsError::CaCertNotFound(ca_cert_path.clone()));
        }
        if !cert_path.exists() {
            return Err(TlsError::CertNotFound(cert_path.clone()));
        }
        if !key_path.exists() {
            return Err(TlsError::KeyNotFound(key_path.clone()));
        }

        let ca_pem = fs::read(ca_cert_path).await?;
        let cert_pem = fs::read(cert_path).await?;
        let key_pem = fs::read(key_path).await?;

        Ok(Self {
            identity: Identity::from_pem(cert_pem, key_pem),
            ca_cert: Certificate::from_pem(ca_pem),
        })
    }

    /// Server config that presents our certificate and requires clients to
    /// present one signed by the CA.
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity.clone())
            .client_ca_root(self.ca_cert.clone())
    }

    /// Client config that presents our certificate and verifies the server
    /// against the CA under [`TLS_DOMAIN_NAME`].
    pub fn client_tls_config(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            // Servers are usually dialed by IP; trust comes from the CA, not the hostname
            .domain_name(TLS_DOMAIN_NAME)
            .ca_certificate(self.ca_cert.clone())
            .identity(self.identity.clone())
    }
}
