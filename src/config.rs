use std::net::SocketAddr;
use std::path::PathBuf;

/// Where and how jobs are launched.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding one output file per job, named by decimal job id.
    pub log_dir: PathBuf,
    /// Shell used to interpret job command lines (`<shell> -c <command>`).
    pub shell: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("log"),
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl SupervisorConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

/// TLS configuration for the job service.
///
/// When enabled, all gRPC communication uses mutual TLS (mTLS):
/// - The server presents its certificate and verifies client certificates
/// - Clients present their certificate and verify the server certificate
/// - Both sides must have certificates signed by the same CA
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Enable TLS. If false, all other TLS settings are ignored.
    pub enabled: bool,

    /// Path to the CA certificate (PEM format).
    /// Used to verify peer certificates.
    pub ca_cert_path: Option<PathBuf>,

    /// Path to this endpoint's certificate (PEM format).
    pub cert_path: Option<PathBuf>,

    /// Path to this endpoint's private key (PEM format).
    /// Must match the certificate.
    pub key_path: Option<PathBuf>,

    /// Allow plaintext serving when TLS material is missing.
    /// When false and TLS files are missing, the server fails to start.
    pub allow_insecure: bool,
}

impl TlsConfig {
    /// Check if TLS is properly configured with all required files.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.ca_cert_path.is_some()
            && self.cert_path.is_some()
            && self.key_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub supervisor: SupervisorConfig,
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:50051"
                .parse()
                .expect("default listen address is valid"),
            supervisor: SupervisorConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.supervisor.log_dir = log_dir.into();
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_config_default() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.log_dir, PathBuf::from("log"));
        assert_eq!(cfg.shell, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn supervisor_config_builders() {
        let cfg = SupervisorConfig::new("/var/lib/jobs").with_shell("/bin/bash");
        assert_eq!(cfg.log_dir, PathBuf::from("/var/lib/jobs"));
        assert_eq!(cfg.shell, PathBuf::from("/bin/bash"));
    }

    #[test]
    fn tls_config_default() {
        let cfg = TlsConfig::default();
        assert!(!cfg.enabled);
        assert!(cfg.ca_cert_path.is_none());
        assert!(cfg.cert_path.is_none());
        assert!(cfg.key_path.is_none());
        assert!(!cfg.allow_insecure);
    }

    #[test]
    fn tls_config_is_not_complete_when_path_missing() {
        let base = TlsConfig {
            enabled: true,
            ca_cert_path: Some(PathBuf::from("/ca.pem")),
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: Some(PathBuf::from("/key.pem")),
            allow_insecure: false,
        };
        assert!(base.is_complete());

        let mut cfg = base.clone();
        cfg.ca_cert_path = None;
        assert!(!cfg.is_complete());

        let mut cfg = base.clone();
        cfg.cert_path = None;
        assert!(!cfg.is_complete());

        let mut cfg = base.clone();
        cfg.key_path = None;
        assert!(!cfg.is_complete());

        let mut cfg = base;
        cfg.enabled = false;
        assert!(!cfg.is_complete());
    }

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:50051");
        assert_eq!(cfg.supervisor.log_dir, PathBuf::from("log"));
        assert!(!cfg.tls.enabled);
    }

    #[test]
    fn server_config_builders() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr)
            .with_log_dir("/tmp/jobs")
            .with_tls(TlsConfig {
                enabled: true,
                ..Default::default()
            });
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.supervisor.log_dir, PathBuf::from("/tmp/jobs"));
        assert!(cfg.tls.enabled);
    }
}
