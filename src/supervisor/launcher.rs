use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::id::IdGenerator;
use super::job::{Job, JobId, ProcessHandle};
use super::log_store::LogStore;
use crate::config::SupervisorConfig;
use crate::error::{JobError, Result};

/// Exit notification posted by a watcher once its child has been reaped.
#[derive(Debug)]
pub struct ProcessExit {
    pub job_id: JobId,
    pub pid: u32,
    /// `None` if waiting on the child failed.
    pub status: Option<ExitStatus>,
}

/// Spawns job commands through a shell with output captured in the log store.
///
/// Command lines are handed verbatim to `<shell> -c`. There is no sandboxing
/// or filtering: callers reach this only through the mutually authenticated
/// job service.
#[derive(Debug)]
pub struct ProcessLauncher {
    ids: IdGenerator,
    log_store: LogStore,
    shell: PathBuf,
}

impl ProcessLauncher {
    pub fn new(config: &SupervisorConfig, log_store: LogStore) -> Self {
        Self {
            ids: IdGenerator::new(),
            log_store,
            shell: config.shell.clone(),
        }
    }

    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Issue an id, create its log file and spawn the command.
    ///
    /// The returned job is not yet registered and its watcher is not running;
    /// the caller registers the job first and then starts the watcher, so an
    /// exit can never be observed before the registration it undoes.
    pub async fn launch(&self, command: &str) -> Result<(Job, Watcher)> {
        self.log_store
            .ensure_dir()
            .await
            .map_err(JobError::LaunchFailed)?;

        let (id, log_file) = self.create_log().await?;

        match self.spawn(id, command, log_file) {
            Ok(spawned) => Ok(spawned),
            Err(e) => {
                tracing::error!(job_id = id, command, error = %e, "Failed to spawn job process");
                // The id was never handed out, so its log must not read as a finished job
                if let Err(discard_err) = self.log_store.discard(id).await {
                    tracing::warn!(
                        job_id = id,
                        error = %discard_err,
                        "Failed to remove log of unlaunched job"
                    );
                }
                Err(JobError::LaunchFailed(e))
            }
        }
    }

    async fn create_log(&self) -> Result<(JobId, std::fs::File)> {
        loop {
            let id = self.ids.next();
            match self.log_store.create(id).await {
                Ok(file) => return Ok((id, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::warn!(
                        job_id = id,
                        "Log file for new job id already exists, skipping id"
                    );
                }
                Err(e) => return Err(JobError::LaunchFailed(e)),
            }
        }
    }

    fn spawn(
        &self,
        id: JobId,
        command: &str,
        log_file: std::fs::File,
    ) -> io::Result<(Job, Watcher)> {
        // stdout and stderr share one open file description so writes interleave in order
        let stderr = log_file.try_clone()?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(log_file)
            .stderr(stderr);

        // SAFETY: pre_exec runs in the forked child before exec. It only makes
        // the prctl syscall, which is async-signal-safe, and touches no shared state.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).map_err(io::Error::from)
            });
        }

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned job process has no pid"))?;

        let log_path = self.log_store.path(id);
        tracing::info!(
            job_id = id,
            pid,
            command,
            log = %log_path.display(),
            "Started job process"
        );

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let job = Job {
            id,
            handle: ProcessHandle::new(pid, signal_tx),
            log_path,
        };
        let watcher = Watcher {
            job_id: id,
            pid,
            child,
            signals: signal_rx,
        };

        Ok((job, watcher))
    }
}

/// Owns a spawned child: waits for its exit and delivers signals to it.
///
/// Being the only place that reaps the child, the watcher never signals a pid
/// that has already been reaped and possibly reused.
#[derive(Debug)]
pub struct Watcher {
    job_id: JobId,
    pid: u32,
    child: Child,
    signals: mpsc::UnboundedReceiver<Signal>,
}

impl Watcher {
    /// Run the watcher on the runtime; it posts one [`ProcessExit`] to `exits`.
    pub fn spawn(self, exits: mpsc::UnboundedSender<ProcessExit>) -> JoinHandle<()> {
        tokio::spawn(self.run(exits))
    }

    async fn run(mut self, exits: mpsc::UnboundedSender<ProcessExit>) {
        loop {
            tokio::select! {
                status = self.child.wait() => {
                    let status = match status {
                        Ok(status) => Some(status),
                        Err(e) => {
                            tracing::warn!(
                                job_id = self.job_id,
                                pid = self.pid,
                                error = %e,
                                "Failed to wait on job process"
                            );
                            None
                        }
                    };
                    if exits.send(ProcessExit {
                        job_id: self.job_id,
                        pid: self.pid,
                        status,
                    }).is_err() {
                        tracing::debug!(
                            job_id = self.job_id,
                            pid = self.pid,
                            "Reaper gone, dropping exit notification"
                        );
                    }
                    return;
                }
                Some(sig) = self.signals.recv() => self.deliver(sig),
            }
        }
    }

    fn deliver(&self, sig: Signal) {
        // id() is None once the child has been reaped
        let Some(pid) = self.child.id() else {
            return;
        };
        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => {
                tracing::debug!(job_id = self.job_id, pid, signal = %sig, "Signalled job process")
            }
            Err(e) => tracing::warn!(
                job_id = self.job_id,
                pid,
                signal = %sig,
                error = %e,
                "Failed to signal job process"
            ),
        }
    }
}
