use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};
use tracing_subscriber::EnvFilter;

use job_worker::config::{ServerConfig, SupervisorConfig, TlsConfig};
use job_worker::grpc::GrpcServer;
use job_worker::proto::job_service_client::JobServiceClient;
use job_worker::proto::{
    GetLogRequest, GetStatusRequest, JobStatus as ProtoJobStatus, StartRequest, StopRequest,
};
use job_worker::shutdown::install_shutdown_handler;
use job_worker::supervisor::JobSupervisor;
use job_worker::tls::{TlsIdentity, TLS_DOMAIN_NAME};

#[derive(Parser, Debug)]
#[command(name = "job-worker")]
#[command(version)]
#[command(about = "Run shell commands as remote background jobs over mTLS gRPC")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the job server
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Directory for job output files (relative paths resolve against the working directory)
    #[arg(long, default_value = "log")]
    log_dir: PathBuf,

    /// Shell used to run job command lines
    #[arg(long, default_value = "/bin/sh")]
    shell: PathBuf,

    /// Path to CA certificate used to verify clients (PEM format)
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Path to server certificate (PEM format)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to server private key (PEM format)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Serve plaintext when TLS material is missing or unreadable.
    /// Anyone who can reach the port can then run commands. NOT for production.
    #[arg(long)]
    allow_insecure: bool,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address (use https:// for TLS)
    #[arg(long, short = 'a', default_value = "https://127.0.0.1:50051")]
    addr: String,

    /// Path to CA certificate (PEM format) for TLS
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (PEM format) for mTLS
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to client private key (PEM format) for mTLS
    #[arg(long)]
    key: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Start a shell command as a background job
    Start {
        /// The command line to run (e.g. "ping -c 3 localhost"); joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Ask a running job to terminate
    Stop { job_id: u64 },
    /// Show whether a job is running or finished
    Status { job_id: u64 },
    /// Print everything a job has written so far
    Log { job_id: u64 },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobStartOutput {
    job_id: u64,
}

#[derive(Serialize)]
struct JobStopOutput {
    job_id: u64,
    stopped: bool,
}

#[derive(Serialize)]
struct JobStatusOutput {
    job_id: u64,
    status: String,
}

#[derive(Serialize)]
struct JobLogOutput {
    job_id: u64,
    found: bool,
    output: String,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn job_status_to_string(status: i32) -> String {
    match ProtoJobStatus::try_from(status) {
        Ok(ProtoJobStatus::Running) => "RUNNING".to_string(),
        Ok(ProtoJobStatus::Finished) => "FINISHED".to_string(),
        Ok(ProtoJobStatus::NotFound) => "NOT_FOUND".to_string(),
        _ => "UNKNOWN".to_string(),
    }
}

async fn create_client_channel(args: &ClientArgs) -> Result<Channel, Box<dyn std::error::Error>> {
    let endpoint = Channel::from_shared(args.addr.clone())?;

    let has_tls = args.ca_cert.is_some() || args.addr.starts_with("https://");
    if !has_tls {
        return Ok(endpoint.connect().await?);
    }

    let mut tls_config = ClientTlsConfig::new().domain_name(TLS_DOMAIN_NAME);

    if let Some(ca_path) = &args.ca_cert {
        let ca_cert = Certificate::from_pem(tokio::fs::read(ca_path).await?);
        tls_config = tls_config.ca_certificate(ca_cert);
    }

    // The server rejects clients without a certificate, but let it say so
    if let (Some(cert_path), Some(key_path)) = (&args.cert, &args.key) {
        let cert_data = tokio::fs::read(cert_path).await?;
        let key_data = tokio::fs::read(key_path).await?;
        tls_config = tls_config.identity(Identity::from_pem(cert_data, key_data));
    }

    Ok(endpoint.tls_config(tls_config)?.connect().await?)
}

fn fail(action: &str, status: tonic::Status) -> ! {
    eprintln!("Error: {} failed: {}", action, status.message());
    std::process::exit(1);
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn load_server_tls(
    tls_config: &TlsConfig,
) -> Result<Option<TlsIdentity>, Box<dyn std::error::Error>> {
    if !tls_config.is_complete() {
        if tls_config.allow_insecure {
            tracing::warn!(
                "TLS certificate paths incomplete, serving plaintext. \
                 Any client that can reach the port can run commands."
            );
            return Ok(None);
        }
        return Err("mTLS requires --ca-cert, --cert and --key (or --allow-insecure)".into());
    }

    match TlsIdentity::load(tls_config).await {
        Ok(identity) => {
            tracing::info!("TLS enabled with mTLS authentication");
            Ok(Some(identity))
        }
        Err(e) if tls_config.allow_insecure => {
            tracing::warn!(error = %e, "TLS certificate loading failed, serving plaintext");
            Ok(None)
        }
        Err(e) => Err(format!("TLS certificate loading failed: {}", e).into()),
    }
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let tls_config = TlsConfig {
        enabled: true,
        ca_cert_path: args.ca_cert,
        cert_path: args.cert,
        key_path: args.key,
        allow_insecure: args.allow_insecure,
    };
    let tls_identity = load_server_tls(&tls_config).await?;

    let log_dir = if args.log_dir.is_absolute() {
        args.log_dir
    } else {
        std::env::current_dir()?.join(args.log_dir)
    };

    let config = ServerConfig {
        listen_addr: SocketAddr::new(args.bind, args.port),
        supervisor: SupervisorConfig::new(log_dir).with_shell(args.shell),
        tls: tls_config,
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        log_dir = %config.supervisor.log_dir.display(),
        shell = %config.supervisor.shell.display(),
        tls_enabled = tls_identity.is_some(),
        "Starting job-worker server"
    );

    let shutdown = install_shutdown_handler()?;

    let (supervisor, reaper) = JobSupervisor::new(&config.supervisor);
    let reaper_handle = tokio::spawn(reaper.run(shutdown.clone()));

    let server = GrpcServer::new(config.listen_addr, Arc::new(supervisor), tls_identity);
    let result = server.run(shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = reaper_handle.await {
        tracing::error!(error = %e, "Reaper task failed");
    }

    result.map_err(|e| e as Box<dyn std::error::Error>)
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_start(
    client: &mut JobServiceClient<Channel>,
    command: Vec<String>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let command = command.join(" ");
    let response = match client.start(StartRequest { command }).await {
        Ok(response) => response.into_inner(),
        Err(status) => fail("Job start", status),
    };

    match output_format {
        OutputFormat::Json => {
            let output = JobStartOutput {
                job_id: response.job_id,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job started successfully!");
            println!("Job ID: {}", response.job_id);
        }
    }
    Ok(())
}

async fn handle_job_stop(
    client: &mut JobServiceClient<Channel>,
    job_id: u64,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(status) = client.stop(StopRequest { job_id }).await {
        if status.code() == tonic::Code::FailedPrecondition {
            eprintln!("Error: job {} is not running", job_id);
            std::process::exit(1);
        }
        fail("Job stop", status);
    }

    match output_format {
        OutputFormat::Json => {
            let output = JobStopOutput {
                job_id,
                stopped: true,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Termination requested for job {}", job_id);
        }
    }
    Ok(())
}

async fn handle_job_status(
    client: &mut JobServiceClient<Channel>,
    job_id: u64,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = match client.get_status(GetStatusRequest { job_id }).await {
        Ok(response) => response.into_inner(),
        Err(status) => fail("Job status", status),
    };

    match output_format {
        OutputFormat::Json => {
            let output = JobStatusOutput {
                job_id: response.job_id,
                status: job_status_to_string(response.status),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job ID:  {}", response.job_id);
            println!("Status:  {}", job_status_to_string(response.status));
        }
    }
    Ok(())
}

async fn handle_job_log(
    client: &mut JobServiceClient<Channel>,
    job_id: u64,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = match client.get_log(GetLogRequest { job_id }).await {
        Ok(response) => response.into_inner(),
        Err(status) => fail("Job log", status),
    };

    match output_format {
        OutputFormat::Json => {
            let output = JobLogOutput {
                job_id: response.job_id,
                found: response.found,
                output: String::from_utf8_lossy(&response.output).into_owned(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if !response.found {
                eprintln!("Error: no log for job {}", job_id);
                std::process::exit(1);
            }
            // Raw bytes, exactly as the job wrote them
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.output)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let channel = create_client_channel(&client).await?;
            // Logs are returned whole, however large
            let mut grpc_client =
                JobServiceClient::new(channel).max_decoding_message_size(usize::MAX);

            match command {
                JobCommands::Start { command: cmd } => {
                    handle_job_start(&mut grpc_client, cmd, &client.output).await?;
                }
                JobCommands::Stop { job_id } => {
                    handle_job_stop(&mut grpc_client, job_id, &client.output).await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&mut grpc_client, job_id, &client.output).await?;
                }
                JobCommands::Log { job_id } => {
                    handle_job_log(&mut grpc_client, job_id, &client.output).await?;
                }
            }
        }
    }

    Ok(())
}
