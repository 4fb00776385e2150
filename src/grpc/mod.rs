pub mod job_service;
pub mod server;

pub use job_service::JobServiceImpl;
pub use server::GrpcServer;
