use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use super::JobId;

/// Per-job output files under a single directory, named by decimal job id.
///
/// Files are created once and never deleted by the store's users after a job
/// has been issued.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `id`. Pure; does not touch the filesystem.
    pub fn path(&self, id: JobId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Create the log directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    /// Create the log file for `id`.
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] if the file is already
    /// there, so an id left behind by an earlier run is never reused.
    pub async fn create(&self, id: JobId) -> io::Result<std::fs::File> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(id))
            .await?;
        Ok(file.into_std().await)
    }

    /// Remove a log file that never became a job.
    pub async fn discard(&self, id: JobId) -> io::Result<()> {
        fs::remove_file(self.path(id)).await
    }

    pub async fn exists(&self, id: JobId) -> io::Result<bool> {
        fs::try_exists(self.path(id)).await
    }

    /// Full current contents of the log for `id`, or `None` if there is none.
    pub async fn read(&self, id: JobId) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
