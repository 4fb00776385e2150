//! Tests for TLS/mTLS functionality.
//!
//! These tests verify:
//! - Certificate loading
//! - Calls over mTLS with a CA-signed client certificate
//! - Rejection of clients without an acceptable certificate


use std::path::{Path, PathBuf};
use std::time::Duration;

use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

use job_worker::config::TlsConfig;
use job_worker::proto::job_service_client::JobServiceClient;
use job_worker::proto::{GetLogRequest, GetStatusRequest, JobStatus, StartRequest};
use job_worker::tls::{TlsError, TlsIdentity, TLS_DOMAIN_NAME};
use test_harness::{assert_eventually, generate_test_certs, TestServer};

fn tls_config(cert_dir: &Path, name: &str) -> TlsConfig {
    TlsConfig {
        enabled: true,
        ca_cert_path: Some(cert_dir.join("ca.crt")),
        cert_path: Some(cert_dir.join(format!("{}.crt", name))),
        key_path: Some(cert_dir.join(format!("{}.key", name))),
        allow_insecure: false,
    }
}

async fn start_tls_server(cert_dir: &Path) -> TestServer {
    let identity = TlsIdentity::load(&tls_config(cert_dir, "server"))
        .await
        .expect("Should load server identity");
    TestServer::start_with_tls(Some(identity)).await
}

async fn tls_client(
    server: &TestServer,
    tls: ClientTlsConfig,
) -> Result<JobServiceClient<Channel>, Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(format!("https://{}", server.addr))?
        .tls_config(tls)?
        .connect_timeout(Duration::from_secs(5))
        .connect()
        .await?;
    Ok(JobServiceClient::new(channel))
}

/// Connect and make one call; either step may be where the server refuses us.
async fn try_call(
    server: &TestServer,
    tls: ClientTlsConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = tls_client(server, tls).await?;
    client.get_status(GetStatusRequest { job_id: 1 }).await?;
    Ok(())
}

// ============================================================================
// TlsIdentity Loading Tests
// ============================================================================

#[tokio::test]
async fn test_load_server_and_client_certificates() {
    let temp_dir = generate_test_certs();

    for name in ["server", "client"] {
        let result = TlsIdentity::load(&tls_config(temp_dir.path(), name)).await;
        assert!(
            result.is_ok(),
            "Should load {} certificates: {:?}",
            name,
            result.err()
        );
    }
}

#[tokio::test]
async fn test_load_nonexistent_cert() {
    let temp_dir = generate_test_certs();

    let mut config = tls_config(temp_dir.path(), "server");
    config.cert_path = Some(PathBuf::from("/nonexistent/server.crt"));

    let result = TlsIdentity::load(&config).await;
    assert!(matches!(result, Err(TlsError::CertNotFound(_))));
}

#[tokio::test]
async fn test_load_nonexistent_key() {
    let temp_dir = generate_test_certs();

    let mut config = tls_config(temp_dir.path(), "server");
    config.key_path = Some(PathBuf::from("/nonexistent/server.key"));

    let result = TlsIdentity::load(&config).await;
    assert!(matches!(result, Err(TlsError::KeyNotFound(_))));
}

// ============================================================================
// mTLS Job Service Tests
// ============================================================================

#[tokio::test]
async fn test_mtls_client_runs_job() {
    let temp_dir = generate_test_certs();
    let server = start_tls_server(temp_dir.path()).await;

    let client_identity = TlsIdentity::load(&tls_config(temp_dir.path(), "client"))
        .await
        .expect("Should load client identity");
    let mut client = tls_client(&server, client_identity.client_tls_config())
        .await
        .expect("mTLS client should connect");

    let job_id = client
        .start(StartRequest {
            command: "echo secure".to_string(),
        })
        .await
        .expect("Start over mTLS should succeed")
        .into_inner()
        .job_id;

    let supervisor = server.jobs.supervisor.clone();
    assert_eventually(
        || {
            let supervisor = supervisor.clone();
            async move { supervisor.running_jobs().await == 0 }
        },
        Duration::from_secs(5),
        "Job should finish",
    )
    .await;

    let status = client
        .get_status(GetStatusRequest { job_id })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(status.status, JobStatus::Finished as i32);

    let log = client
        .get_log(GetLogRequest { job_id })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(log.output, b"secure\n");
}

#[tokio::test]
async fn test_client_without_certificate_is_rejected() {
    let temp_dir = generate_test_certs();
    let server = start_tls_server(temp_dir.path()).await;

    let ca_pem = std::fs::read(temp_dir.path().join("ca.crt")).unwrap();
    let tls = ClientTlsConfig::new()
        .domain_name(TLS_DOMAIN_NAME)
        .ca_certificate(Certificate::from_pem(ca_pem));

    assert!(
        try_call(&server, tls).await.is_err(),
        "Server must refuse clients that present no certificate"
    );
    assert!(server.is_running());
}

#[tokio::test]
async fn test_client_from_other_ca_is_rejected() {
    let temp_dir = generate_test_certs();
    let other_dir = generate_test_certs();
    let server = start_tls_server(temp_dir.path()).await;

    // Trusts the right CA but presents a certificate signed by a foreign one
    let ca_pem = std::fs::read(temp_dir.path().join("ca.crt")).unwrap();
    let cert = std::fs::read(other_dir.path().join("client.crt")).unwrap();
    let key = std::fs::read(other_dir.path().join("client.key")).unwrap();
    let tls = ClientTlsConfig::new()
        .domain_name(TLS_DOMAIN_NAME)
        .ca_certificate(Certificate::from_pem(ca_pem))
        .identity(Identity::from_pem(cert, key));

    assert!(
        try_call(&server, tls).await.is_err(),
        "Server must refuse certificates from an untrusted CA"
    );
}

#[tokio::test]
async fn test_plaintext_client_is_rejected() {
    let temp_dir = generate_test_certs();
    let server = start_tls_server(temp_dir.path()).await;

    let result = async {
        let channel = Channel::from_shared(format!("http://{}", server.addr))?
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(5))
            .connect()
            .await?;
        JobServiceClient::new(channel)
            .get_status(GetStatusRequest { job_id: 1 })
            .await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .await;

    assert!(result.is_err(), "Plaintext calls to an mTLS server must fail");
}

#[test]
fn test_cert_generation_script_exists() {
    let script_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts/gen-test-certs.sh");
    assert!(
        script_path.exists(),
        "Certificate generation script should exist"
    );
}

#[test]
fn test_generated_certs_have_correct_files() {
    let temp_dir = generate_test_certs();

    for file in ["ca.crt", "ca.key", "server.crt", "server.key", "client.crt", "client.key"] {
        let path = temp_dir.path().join(file);
        assert!(path.exists(), "Generated certs should include {}", file);
    }
}
