use thiserror::Error;

use crate::supervisor::JobId;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to launch job: {0}")]
    LaunchFailed(#[source] std::io::Error),

    #[error("Job {0} is not running")]
    NotRunning(JobId),

    #[error("Exited process {0} has no matching job")]
    ReapInconsistency(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<JobError> for tonic::Status {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotRunning(_) => tonic::Status::failed_precondition(err.to_string()),
            JobError::LaunchFailed(_) | JobError::ReapInconsistency(_) | JobError::Io(_) => {
                tonic::Status::internal(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
