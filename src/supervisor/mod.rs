//! Job supervision: launching shell jobs, tracking them while they run, and
//! answering status and log queries.
//!
//! # Components
//!
//! - [`IdGenerator`]: unique job ids
//! - [`LogStore`]: one output file per job, never deleted
//! - [`ProcessLauncher`]: spawns `<shell> -c <command>` with output in the log
//! - [`JobRegistry`]: ids of jobs believed to be running
//! - [`Reaper`]: removes jobs from the registry as their processes exit
//! - [`JobSupervisor`]: Start / Stop / GetStatus / GetLog over all of the above
//!
//! # Job lifecycle
//!
//! 1. `start` issues an id and creates `<log dir>/<id>`
//! 2. The child is spawned with stdout and stderr on that file
//! 3. The job is inserted into the registry, then its watcher starts
//! 4. When the child exits the watcher posts a [`ProcessExit`]; the reaper
//!    removes the job. The log file stays.
//!
//! A job is `Running` while it is in the registry, `Finished` once it is gone
//! but its log exists, and `NotFound` when there is no log at all.

pub mod id;
pub mod job;
pub mod launcher;
pub mod log_store;
pub mod reaper;
pub mod registry;

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;

pub use id::IdGenerator;
pub use job::{Job, JobId, JobStatus, ProcessHandle};
pub use launcher::{ProcessExit, ProcessLauncher};
pub use log_store::LogStore;
pub use reaper::Reaper;
pub use registry::JobRegistry;

use crate::config::SupervisorConfig;
use crate::error::{JobError, Result};

/// Control and query facade over the launcher, registry and log store.
pub struct JobSupervisor {
    launcher: Arc<ProcessLauncher>,
    registry: Arc<JobRegistry>,
    log_store: LogStore,
    exits: mpsc::UnboundedSender<ProcessExit>,
}

impl JobSupervisor {
    /// Build a supervisor and the reaper that must run alongside it.
    ///
    /// Until [`Reaper::run`] is spawned, finished jobs keep reporting `Running`.
    pub fn new(config: &SupervisorConfig) -> (Self, Reaper) {
        let log_store = LogStore::new(&config.log_dir);
        Self::with_launcher(ProcessLauncher::new(config, log_store.clone()), log_store)
    }

    pub fn with_launcher(launcher: ProcessLauncher, log_store: LogStore) -> (Self, Reaper) {
        let registry = Arc::new(JobRegistry::new());
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            launcher: Arc::new(launcher),
            registry: registry.clone(),
            log_store,
            exits: exits_tx,
        };

        (supervisor, Reaper::new(registry, exits_rx))
    }

    /// Launch `command` as a background job and return its id.
    ///
    /// The command not existing is not an error here; the shell reports it in
    /// the job's log and the job finishes.
    ///
    /// Dropping the returned future does not abandon the launch: once begun, the
    /// job is spawned, registered and watched to completion.
    pub async fn start(&self, command: &str) -> Result<JobId> {
        let launcher = self.launcher.clone();
        let registry = self.registry.clone();
        let exits = self.exits.clone();
        let command = command.to_owned();

        let launch = tokio::spawn(async move {
            let (job, watcher) = launcher.launch(&command).await?;
            let id = job.id;

            registry.insert(job).await;
            watcher.spawn(exits);

            Ok::<_, JobError>(id)
        });

        launch
            .await
            .map_err(|e| JobError::LaunchFailed(io::Error::other(e)))?
    }

    /// Ask a running job to terminate. Does not wait for it to exit.
    pub async fn stop(&self, id: JobId) -> Result<()> {
        let job = self
            .registry
            .lookup(id)
            .await
            .ok_or(JobError::NotRunning(id))?;

        if job.handle.terminate() {
            tracing::info!(job_id = id, pid = job.handle.pid(), "Sent termination request");
        } else {
            // Already exited; the reaper has not caught up yet
            tracing::debug!(
                job_id = id,
                pid = job.handle.pid(),
                "Job exited before termination request"
            );
        }
        Ok(())
    }

    pub async fn status(&self, id: JobId) -> Result<JobStatus> {
        if !self.log_store.exists(id).await? {
            return Ok(JobStatus::NotFound);
        }

        if self.registry.contains(id).await {
            Ok(JobStatus::Running)
        } else {
            Ok(JobStatus::Finished)
        }
    }

    /// Everything the job has written so far, or `None` for an unknown id.
    pub async fn log(&self, id: JobId) -> Result<Option<Vec<u8>>> {
        let log = self.log_store.read(id).await?;
        if log.is_none() {
            tracing::debug!(job_id = id, "No log for job");
        }
        Ok(log)
    }

    pub async fn running_jobs(&self) -> usize {
        self.registry.len().await
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log_store
    }
}
