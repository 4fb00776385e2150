use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::job_service::JobServiceImpl;
use crate::proto::job_service_server::JobServiceServer;
use crate::supervisor::JobSupervisor;
use crate::tls::TlsIdentity;

pub struct GrpcServer {
    addr: SocketAddr,
    supervisor: Arc<JobSupervisor>,
    tls_identity: Option<TlsIdentity>,
}

impl GrpcServer {
    pub fn new(
        addr: SocketAddr,
        supervisor: Arc<JobSupervisor>,
        tls_identity: Option<TlsIdentity>,
    ) -> Self {
        Self {
            addr,
            supervisor,
            tls_identity,
        }
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(
        self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let local_addr = listener.local_addr()?;
        let job_service = JobServiceServer::new(JobServiceImpl::new(self.supervisor));

        let mut builder = Server::builder();
        if let Some(ref tls_identity) = self.tls_identity {
            builder = builder.tls_config(tls_identity.server_tls_config())?;
        }

        tracing::info!(
            addr = %local_addr,
            tls_enabled = self.tls_identity.is_some(),
            "Starting gRPC server"
        );

        builder
            .add_service(job_service)
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                shutdown.cancelled_owned(),
            )
            .await?;

        tracing::info!("gRPC server stopped");
        Ok(())
    }
}
