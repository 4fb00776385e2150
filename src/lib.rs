pub mod config;
pub mod error;
pub mod grpc;
pub mod shutdown;
pub mod supervisor;
pub mod tls;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("jobworker");
}
