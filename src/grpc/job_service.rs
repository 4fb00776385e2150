use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::job_service_server::JobService;
use crate::proto::{
    GetLogRequest, GetLogResponse, GetStatusRequest, GetStatusResponse, JobStatus as ProtoJobStatus,
    StartRequest, StartResponse, StopRequest, StopResponse,
};
use crate::supervisor::{JobStatus, JobSupervisor};

/// gRPC front of the job supervisor.
///
/// The transport is expected to have authenticated the caller already.
pub struct JobServiceImpl {
    supervisor: Arc<JobSupervisor>,
}

impl JobServiceImpl {
    pub fn new(supervisor: Arc<JobSupervisor>) -> Self {
        Self { supervisor }
    }
}

impl From<JobStatus> for ProtoJobStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => ProtoJobStatus::Running,
            JobStatus::Finished => ProtoJobStatus::Finished,
            JobStatus::NotFound => ProtoJobStatus::NotFound,
        }
    }
}

#[tonic::async_trait]
impl JobService for JobServiceImpl {
    async fn start(
        &self,
        request: Request<StartRequest>,
    ) -> Result<Response<StartResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(command = %req.command, "Start requested");

        let job_id = self.supervisor.start(&req.command).await?;
        Ok(Response::new(StartResponse { job_id }))
    }

    async fn stop(&self, request: Request<StopRequest>) -> Result<Response<StopResponse>, Status> {
        let job_id = request.into_inner().job_id;
        tracing::info!(job_id, "Stop requested");

        if let Err(e) = self.supervisor.stop(job_id).await {
            tracing::warn!(job_id, error = %e, "Stop rejected");
            return Err(e.into());
        }
        Ok(Response::new(StopResponse {}))
    }

    async fn get_status(
        &self,
        request: Request<GetStatusRequest>,
    ) -> Result<Response<GetStatusResponse>, Status> {
        let job_id = request.into_inner().job_id;
        let status = self.supervisor.status(job_id).await?;
        tracing::debug!(job_id, %status, "Status queried");

        Ok(Response::new(GetStatusResponse {
            job_id,
            status: ProtoJobStatus::from(status).into(),
        }))
    }

    async fn get_log(
        &self,
        request: Request<GetLogRequest>,
    ) -> Result<Response<GetLogResponse>, Status> {
        let job_id = request.into_inner().job_id;
        let log = self.supervisor.log(job_id).await?;
        tracing::debug!(job_id, bytes = ?log.as_ref().map(Vec::len), "Log queried");

        Ok(Response::new(match log {
            Some(output) => GetLogResponse {
                job_id,
                found: true,
                output,
            },
            None => GetLogResponse {
                job_id,
                found: false,
                output: Vec::new(),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_proto() {
        assert_eq!(ProtoJobStatus::from(JobStatus::Running), ProtoJobStatus::Running);
        assert_eq!(ProtoJobStatus::from(JobStatus::Finished), ProtoJobStatus::Finished);
        assert_eq!(ProtoJobStatus::from(JobStatus::NotFound), ProtoJobStatus::NotFound);
    }
}
