use std::os::unix::process::ExitStatusExt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::launcher::ProcessExit;
use super::registry::JobRegistry;
use crate::error::JobError;

/// Most exit notifications taken from the channel in one pass.
const REAP_BATCH: usize = 64;

/// Removes jobs from the registry as their processes exit.
pub struct Reaper {
    registry: Arc<JobRegistry>,
    exits: mpsc::UnboundedReceiver<ProcessExit>,
}

impl Reaper {
    pub(crate) fn new(
        registry: Arc<JobRegistry>,
        exits: mpsc::UnboundedReceiver<ProcessExit>,
    ) -> Self {
        Self { registry, exits }
    }

    /// Drain exit notifications until `shutdown` is cancelled or every sender
    /// is gone.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut batch = Vec::with_capacity(REAP_BATCH);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reaper shutting down");
                    break;
                }
                received = self.exits.recv_many(&mut batch, REAP_BATCH) => {
                    if received == 0 {
                        tracing::debug!("Exit channel closed, reaper stopping");
                        break;
                    }
                    for exit in batch.drain(..) {
                        self.reap(exit).await;
                    }
                }
            }
        }
    }

    async fn reap(&self, exit: ProcessExit) {
        let code = exit.status.and_then(|s| s.code());
        let signal = exit.status.and_then(|s| s.signal());

        match self.registry.remove_by_process(exit.job_id, exit.pid).await {
            Some(job_id) => {
                tracing::info!(
                    job_id,
                    pid = exit.pid,
                    exit_code = ?code,
                    signal = ?signal,
                    "Job finished"
                );
            }
            None => {
                // Never registered, or already removed
                let err = JobError::ReapInconsistency(exit.pid);
                tracing::warn!(
                    job_id = exit.job_id,
                    error = %err,
                    exit_code = ?code,
                    signal = ?signal,
                    "Untracked process exit"
                );
            }
        }
    }
}
