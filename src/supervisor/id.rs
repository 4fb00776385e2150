use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use super::JobId;

/// Issues job ids that never repeat within one server run.
///
/// The high 32 bits hold the wall-clock second the generator was created, the
/// low 32 bits a per-process counter. Two runs started within the same second
/// can overlap; the launcher detects that through the log store and skips ids
/// whose log file already exists.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        // Wraps in 2106; an id colliding with an old log is skipped by the launcher
        Self::with_epoch(Utc::now().timestamp() as u32)
    }

    /// Generator whose ids start at `epoch_secs << 32`.
    pub fn with_epoch(epoch_secs: u32) -> Self {
        Self {
            next: AtomicU64::new(u64::from(epoch_secs) << 32),
        }
    }

    pub fn next(&self) -> JobId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
