use std::path::PathBuf;

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

pub type JobId = u64;

/// Externally visible state of a job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Finished,
    NotFound,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::NotFound => write!(f, "not found"),
        }
    }
}

/// Reference to a spawned job process.
///
/// Signals are not sent to the pid directly; they are handed to the task that
/// owns the child, which only delivers them while the child is unreaped.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    signals: mpsc::UnboundedSender<Signal>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self { pid, signals }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Request delivery of `signal`. Returns false if the process has already
    /// been reaped.
    pub fn signal(&self, signal: Signal) -> bool {
        self.signals.send(signal).is_ok()
    }

    pub fn terminate(&self) -> bool {
        self.signal(Signal::SIGTERM)
    }
}

/// A running job as tracked by the registry.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub handle: ProcessHandle,
    pub log_path: PathBuf,
}
