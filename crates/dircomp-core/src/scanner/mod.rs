/// Scanner module: the comparison session and its worker pool.
///
/// A [`ComparisonSession`] owns the tree, a priority queue of scan tasks and
/// a fixed pool of worker threads. Workers pull the highest-priority task,
/// list or read through the providers with no locks held, then commit the
/// result into the shared [`TreeStore`]. The UI never receives callbacks: it
/// polls [`ComparisonSession::current_version`] and re-projects when it moves.
///
/// # Epochs
///
/// Every task carries the epoch it was created under. Commits run under a
/// read guard of the epoch gate and re-check the epoch there; `cancel` and
/// `refresh` take the write guard, so once either returns no result from an
/// older epoch can land in the tree.
pub mod queue;
pub mod stats;
mod worker;

use crate::config::CompareConfig;
use crate::engine::Side;
use crate::model::{DiffStatus, NodeIndex, Presence, ScanState, TreeStore};
use crate::projector::{self, VisibleRow};
use crate::provider::local::LocalProvider;
use crate::provider::FileSystemProvider;
use crate::summary::DiffSummary;
use parking_lot::{Mutex, RwLock};
use queue::{Priority, ScanTask, TaskKind, TaskQueue};
use stats::{Counters, ScanStats};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
struct EpochState {
    epoch: u64,
    cancelled: bool,
}

/// State shared between the session handle and its workers.
pub(crate) struct SessionInner {
    left_root: PathBuf,
    right_root: PathBuf,
    left: Arc<dyn FileSystemProvider>,
    right: Arc<dyn FileSystemProvider>,
    pub(crate) config: CompareConfig,
    pub(crate) tree: TreeStore,
    pub(crate) queue: TaskQueue,
    gate: RwLock<EpochState>,
    /// Lock-free mirror of `gate.epoch` for cheap staleness checks.
    epoch: AtomicU64,
    unavailable: [AtomicBool; 2],
    pub(crate) counters: Counters,
    pub(crate) active: AtomicUsize,
    started: Mutex<Instant>,
    finished: Mutex<Option<Duration>>,
}

impl SessionInner {
    #[inline]
    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn provider(&self, side: Side) -> &dyn FileSystemProvider {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// Absolute path of a node's raw relative path on one side.
    pub(crate) fn side_path(&self, side: Side, raw_path: &Path) -> PathBuf {
        let root = match side {
            Side::Left => &self.left_root,
            Side::Right => &self.right_root,
        };
        if raw_path.as_os_str().is_empty() {
            root.clone()
        } else {
            root.join(raw_path)
        }
    }

    pub(crate) fn is_unavailable(&self, side: Side) -> bool {
        self.unavailable[side as usize].load(Ordering::Acquire)
    }

    pub(crate) fn mark_unavailable(&self, side: Side) {
        if !self.unavailable[side as usize].swap(true, Ordering::AcqRel) {
            warn!(
                "{} backend unavailable; skipping remaining tasks for that side",
                self.provider(side).name()
            );
        }
    }

    /// Run `f` only if `epoch` is still current and not cancelled.
    ///
    /// The gate's read guard is held for the whole of `f`, so a concurrent
    /// cancel waits until this commit (and its propagation) is complete.
    pub(crate) fn commit<R>(&self, epoch: u64, f: impl FnOnce() -> R) -> Option<R> {
        let gate = self.gate.read();
        if gate.cancelled || gate.epoch != epoch {
            Counters::add(&self.counters.discarded, 1);
            debug!("Discarding result from epoch {epoch} (current {})", gate.epoch);
            return None;
        }
        let result = f();
        drop(gate);
        Some(result)
    }

    /// Record the completion time the first time the root settles.
    pub(crate) fn note_progress(&self) {
        let done = self.tree.read(NodeIndex::ROOT, |n| n.is_done()).unwrap_or(false);
        if !done {
            return;
        }
        let mut finished = self.finished.lock();
        if finished.is_none() {
            let elapsed = self.started.lock().elapsed();
            *finished = Some(elapsed);
            info!(
                "Comparison complete in {:.2}s ({} directories, {} files compared)",
                elapsed.as_secs_f64(),
                self.counters.dirs_listed.load(Ordering::Relaxed),
                self.counters.files_compared.load(Ordering::Relaxed),
            );
        }
    }
}

/// A running (or finished) comparison of two directory trees.
///
/// Dropping the session shuts the queue down; idle workers exit at once and
/// busy ones after their current task, whose result is discarded with the
/// tree.
pub struct ComparisonSession {
    inner: Arc<SessionInner>,
    expanded: Mutex<HashSet<NodeIndex>>,
    hide_identical: AtomicBool,
}

impl ComparisonSession {
    /// Compare two local directories.
    pub fn start(left: impl Into<PathBuf>, right: impl Into<PathBuf>, config: CompareConfig) -> Self {
        Self::start_with_providers(
            left,
            Arc::new(LocalProvider::new()),
            right,
            Arc::new(LocalProvider::new()),
            config,
        )
    }

    /// Compare two trees served by arbitrary providers.
    ///
    /// Returns immediately; the root listing is queued for the worker pool
    /// and results appear in [`tree`](Self::tree) progressively.
    pub fn start_with_providers(
        left_root: impl Into<PathBuf>,
        left: Arc<dyn FileSystemProvider>,
        right_root: impl Into<PathBuf>,
        right: Arc<dyn FileSystemProvider>,
        config: CompareConfig,
    ) -> Self {
        let left_root = left_root.into();
        let right_root = right_root.into();
        let worker_count = config.worker_count.max(1);
        let hide_identical = config.hide_identical;

        info!(
            "Starting comparison of {} ({}) and {} ({}) with {worker_count} workers",
            left_root.display(),
            left.name(),
            right_root.display(),
            right.name(),
        );

        let inner = Arc::new(SessionInner {
            left_root,
            right_root,
            left,
            right,
            config,
            tree: TreeStore::new(),
            queue: TaskQueue::new(),
            gate: RwLock::new(EpochState {
                epoch: 1,
                cancelled: false,
            }),
            epoch: AtomicU64::new(1),
            unavailable: [AtomicBool::new(false), AtomicBool::new(false)],
            counters: Counters::default(),
            active: AtomicUsize::new(0),
            started: Mutex::new(Instant::now()),
            finished: Mutex::new(None),
        });

        for i in 0..worker_count {
            let worker_inner = Arc::clone(&inner);
            thread::Builder::new()
                .name(format!("dircomp-worker-{i}"))
                .spawn(move || worker::run_worker_loop(worker_inner))
                .expect("failed to spawn comparison worker thread");
        }

        let session = Self {
            inner,
            expanded: Mutex::new(HashSet::new()),
            hide_identical: AtomicBool::new(hide_identical),
        };
        session.seed_root();
        session
    }

    fn seed_root(&self) {
        let epoch = self.inner.current_epoch();
        self.inner.tree.mutate(NodeIndex::ROOT, |root| {
            root.scan_state = ScanState::Queued;
        });
        self.inner.queue.push(ScanTask {
            node: NodeIndex::ROOT,
            kind: TaskKind::ListDirectory,
            priority: Priority::BACKGROUND,
            epoch,
        });
    }

    /// Start a new comparison with left and right exchanged.
    pub fn swapped(&self) -> Self {
        Self::start_with_providers(
            self.inner.right_root.clone(),
            Arc::clone(&self.inner.right),
            self.inner.left_root.clone(),
            Arc::clone(&self.inner.left),
            self.inner.config.clone(),
        )
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn tree(&self) -> &TreeStore {
        &self.inner.tree
    }

    pub fn config(&self) -> &CompareConfig {
        &self.inner.config
    }

    pub fn left_root(&self) -> &Path {
        &self.inner.left_root
    }

    pub fn right_root(&self) -> &Path {
        &self.inner.right_root
    }

    /// Global tree version. Poll once per frame; re-project only on change.
    #[inline]
    pub fn current_version(&self) -> u64 {
        self.inner.tree.current_version()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.current_epoch()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.gate.read().cancelled
    }

    /// The root and its whole subtree are settled.
    pub fn is_complete(&self) -> bool {
        self.inner
            .tree
            .read(NodeIndex::ROOT, |n| n.is_done())
            .unwrap_or(false)
    }

    /// Progress counters for the status line.
    pub fn stats(&self) -> ScanStats {
        let counters = &self.inner.counters;
        let elapsed = match *self.inner.finished.lock() {
            Some(elapsed) => elapsed,
            None => self.inner.started.lock().elapsed(),
        };
        ScanStats {
            epoch: self.epoch(),
            dirs_listed: counters.dirs_listed.load(Ordering::Relaxed),
            files_compared: counters.files_compared.load(Ordering::Relaxed),
            bytes_compared: counters.bytes_compared.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            pending_tasks: self.inner.queue.len(),
            active_tasks: self.inner.active.load(Ordering::Acquire),
            elapsed,
            complete: self.is_complete(),
            cancelled: self.is_cancelled(),
        }
    }

    /// Per-status counts over the whole tree. O(n).
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::collect(&self.inner.tree)
    }

    /// Absolute paths of a file pair, for handing off to a line-level diff.
    pub fn file_pair(&self, index: NodeIndex) -> Option<(PathBuf, PathBuf)> {
        let relative = self.inner.tree.read(index, |n| {
            (n.left == Presence::File && n.right == Presence::File).then(|| n.raw_path.clone())
        })??;
        Some((
            self.inner.side_path(Side::Left, &relative),
            self.inner.side_path(Side::Right, &relative),
        ))
    }

    /// Block until the comparison completes or `timeout` elapses. Returns
    /// whether it completed. Intended for the CLI and tests; a UI polls.
    pub fn wait_until_complete(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_complete() {
                return true;
            }
            if self.is_cancelled() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    // ── Scheduling ─────────────────────────────────────────

    /// Queue work for `index` at `priority`. Returns `false` if there is
    /// nothing left to do for it or the session is cancelled.
    pub fn enqueue(&self, index: NodeIndex, priority: Priority) -> bool {
        let epoch = self.inner.current_epoch();
        let queued = self.inner.commit(epoch, || {
            let kind = self.inner.tree.mutate(index, |n| {
                let kind = if n.is_container() && !n.listed && n.status != DiffStatus::Error {
                    TaskKind::ListDirectory
                } else if n.left == Presence::File
                    && n.right == Presence::File
                    && n.scan_state != ScanState::Done
                {
                    TaskKind::CompareFiles
                } else {
                    return None;
                };
                if n.scan_state == ScanState::NotScanned {
                    n.scan_state = ScanState::Queued;
                }
                Some(kind)
            })??;
            self.inner
                .queue
                .push(ScanTask {
                    node: index,
                    kind,
                    priority,
                    epoch,
                })
                .then_some(())
        });
        matches!(queued, Some(Some(())))
    }

    /// Re-queue still-queued nodes at viewport priority. The original tasks
    /// stay in the queue; whichever runs second finds nothing to do.
    pub fn prioritize(&self, nodes: &[NodeIndex]) {
        let epoch = self.inner.current_epoch();
        for &index in nodes {
            let kind = self.inner.tree.read(index, |n| {
                if n.scan_state != ScanState::Queued {
                    None
                } else if n.is_container() && !n.listed {
                    Some(TaskKind::ListDirectory)
                } else if n.left == Presence::File && n.right == Presence::File {
                    Some(TaskKind::CompareFiles)
                } else {
                    None
                }
            });
            if let Some(Some(kind)) = kind {
                self.inner.queue.push(ScanTask {
                    node: index,
                    kind,
                    priority: Priority::VISIBLE,
                    epoch,
                });
            }
        }
    }

    /// List a directory synchronously on the calling thread, bypassing the
    /// queue, so its direct children exist when this returns.
    ///
    /// Returns `false` if the node is not a directory or the session is
    /// cancelled. Already-listed directories return `true` at once.
    pub fn expand_on_demand(&self, index: NodeIndex) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let needs_listing = self.inner.tree.read(index, |n| {
            let root_unresolved = index == NodeIndex::ROOT && !n.listed && !n.is_done();
            (n.is_container() || root_unresolved, !n.listed && n.status != DiffStatus::Error)
        });
        match needs_listing {
            Some((true, true)) => {
                let epoch = self.inner.current_epoch();
                debug!("Listing {index:?} on demand");
                // After a refresh the node may outlive its parent's listing;
                // re-list the unlisted ancestors first, top down.
                let mut chain = self.inner.tree.ancestors(index);
                chain.reverse();
                for node in chain {
                    worker::scan_directory(&self.inner, node, epoch, Priority::VISIBLE);
                }
                self.inner.note_progress();
                true
            }
            Some((true, false)) => true,
            _ => false,
        }
    }

    // ── Expansion & filtering ──────────────────────────────

    /// Expand a directory by relative path, listing it on demand if needed.
    pub fn expand(&self, relative_path: &str) -> bool {
        match self.inner.tree.lookup(relative_path) {
            Some(index) => self.expand_index(index),
            None => false,
        }
    }

    pub fn expand_index(&self, index: NodeIndex) -> bool {
        if !self.expand_on_demand(index) {
            return false;
        }
        self.expanded.lock().insert(index);
        true
    }

    pub fn collapse(&self, relative_path: &str) -> bool {
        match self.inner.tree.lookup(relative_path) {
            Some(index) => self.collapse_index(index),
            None => false,
        }
    }

    pub fn collapse_index(&self, index: NodeIndex) -> bool {
        self.expanded.lock().remove(&index)
    }

    pub fn is_expanded(&self, index: NodeIndex) -> bool {
        self.expanded.lock().contains(&index)
    }

    /// Expand every directory that is already listed. Never triggers
    /// synchronous scans.
    pub fn expand_all(&self) {
        let mut listed = Vec::new();
        self.inner.tree.for_each(|index, node| {
            if index != NodeIndex::ROOT && node.is_container() && node.listed {
                listed.push(index);
            }
        });
        self.expanded.lock().extend(listed);
    }

    pub fn collapse_all(&self) {
        self.expanded.lock().clear();
    }

    /// Flip the identical-entry filter and return the new state.
    pub fn toggle_hide_identical(&self) -> bool {
        !self.hide_identical.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn hide_identical(&self) -> bool {
        self.hide_identical.load(Ordering::Acquire)
    }

    /// Project the tree into display rows under the current expansion and
    /// filter state.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let expanded = self.expanded.lock().clone();
        projector::project(
            &self.inner.tree,
            NodeIndex::ROOT,
            &expanded,
            self.hide_identical(),
            self.inner.config.max_visible_rows,
        )
    }

    // ── Cancellation & rescan ──────────────────────────────

    /// Stop the comparison. In-flight tasks finish their I/O but their
    /// results are discarded; after this returns no node changes until
    /// [`refresh`](Self::refresh).
    pub fn cancel(&self) {
        let mut gate = self.inner.gate.write();
        if gate.cancelled {
            return;
        }
        gate.epoch += 1;
        gate.cancelled = true;
        self.inner.epoch.store(gate.epoch, Ordering::Release);
        let dropped = self.inner.queue.clear();
        info!("Comparison cancelled; dropped {dropped} queued tasks");
    }

    /// Rescan both trees from the root under a new epoch.
    ///
    /// Existing nodes are kept (so the UI cursor holds its place) and reset
    /// to `NotScanned`; entries that no longer exist on either side are
    /// marked as errors when their parent is re-listed.
    pub fn refresh(&self) {
        {
            let mut gate = self.inner.gate.write();
            gate.epoch += 1;
            gate.cancelled = false;
            self.inner.epoch.store(gate.epoch, Ordering::Release);
            self.inner.queue.clear();
            self.inner.counters.reset();
            for flag in &self.inner.unavailable {
                flag.store(false, Ordering::Release);
            }
            *self.inner.started.lock() = Instant::now();
            *self.inner.finished.lock() = None;
            self.inner.tree.mutate_all(|node| node.reset_for_rescan());
            info!("Refreshing comparison (epoch {})", gate.epoch);
        }
        self.seed_root();
    }
}

impl Drop for ComparisonSession {
    fn drop(&mut self) {
        self.inner.queue.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;

    fn session_over(left: MemoryProvider, right: MemoryProvider) -> ComparisonSession {
        let config = CompareConfig {
            worker_count: 2,
            ..CompareConfig::default()
        };
        ComparisonSession::start_with_providers("/l", Arc::new(left), "/r", Arc::new(right), config)
    }

    #[test]
    fn identical_trees_settle_identical() {
        let left = MemoryProvider::new("left");
        left.add_file("/l/a.txt", b"same".to_vec());
        let right = MemoryProvider::new("right");
        right.add_file("/r/a.txt", b"same".to_vec());

        let session = session_over(left, right);
        assert!(session.wait_until_complete(Duration::from_secs(5)));
        let root = session.tree().snapshot(NodeIndex::ROOT).unwrap();
        assert_eq!(root.status, DiffStatus::Identical);
        assert_eq!(session.summary().identical, 1);
    }

    #[test]
    fn toggle_hide_identical_returns_new_state() {
        let session = session_over(MemoryProvider::new("l"), MemoryProvider::new("r"));
        assert!(!session.hide_identical());
        assert!(session.toggle_hide_identical());
        assert!(session.hide_identical());
        assert!(!session.toggle_hide_identical());
    }

    #[test]
    fn cancel_blocks_further_expansion() {
        let left = MemoryProvider::new("left");
        left.add_dir("/l");
        let right = MemoryProvider::new("right");
        right.add_dir("/r");
        let session = session_over(left, right);
        session.cancel();
        assert!(session.is_cancelled());
        assert!(!session.expand_on_demand(NodeIndex::ROOT));
        assert!(!session.enqueue(NodeIndex::ROOT, Priority::VISIBLE));
    }
}
