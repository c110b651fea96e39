/// Scan progress counters.
///
/// Workers bump atomics; the UI reads a [`ScanStats`] snapshot whenever it
/// redraws. There is no push channel from workers to the UI.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub dirs_listed: AtomicU64,
    pub files_compared: AtomicU64,
    pub bytes_compared: AtomicU64,
    pub errors: AtomicU64,
    pub discarded: AtomicU64,
}

impl Counters {
    pub fn reset(&self) {
        for counter in [
            &self.dirs_listed,
            &self.files_compared,
            &self.bytes_compared,
            &self.errors,
            &self.discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time view of a session's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub epoch: u64,
    pub dirs_listed: u64,
    pub files_compared: u64,
    pub bytes_compared: u64,
    /// Nodes marked `Error` in the current epoch.
    pub errors: u64,
    /// Results dropped because their epoch was stale.
    pub discarded: u64,
    pub pending_tasks: usize,
    pub active_tasks: usize,
    pub elapsed: Duration,
    pub complete: bool,
    pub cancelled: bool,
}
