use std::collections::HashMap;

use tokio::sync::Mutex;

use super::job::{Job, JobId};

/// Jobs currently believed to be running, keyed by id.
///
/// Every operation takes the lock for the map operation only; callers outside
/// the supervisor never see the map itself.
#[derive(Debug, Default)]
pub struct JobRegistry {
    pub(super) jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.lock().await.insert(job.id, job);
    }

    pub async fn lookup(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: JobId) -> bool {
        self.jobs.lock().await.contains_key(&id)
    }

    /// Remove job `id` if its process has pid `pid`, returning the id.
    ///
    /// A pid alone is not enough: it may already belong to a newer job.
    pub async fn remove_by_process(&self, id: JobId, pid: u32) -> Option<JobId> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get(&id) {
            Some(job) if job.handle.pid() == pid => {
                jobs.remove(&id);
                Some(id)
            }
            _ => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}
