/// Blocking priority queue shared by the worker pool.
///
/// Higher [`Priority`] first; equal priorities are served in discovery
/// order. Workers block on a condition variable while the queue is empty.
use crate::model::NodeIndex;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Scheduling priority. Larger values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

impl Priority {
    /// Seed priority for background scanning of the root.
    pub const BACKGROUND: Priority = Priority(1 << 16);
    /// Nodes currently in the UI viewport. Their whole subtree stays above
    /// every background task.
    pub const VISIBLE: Priority = Priority(1 << 30);

    /// One tier below `self`, used for newly discovered children.
    #[inline]
    pub fn lower(self) -> Priority {
        Priority(self.0.saturating_sub(1))
    }
}

/// What a task does with its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// List both sides of a directory and classify its children.
    ListDirectory,
    /// Byte-compare an equal-sized file pair.
    CompareFiles,
}

/// A unit of work for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTask {
    pub node: NodeIndex,
    pub kind: TaskKind,
    pub priority: Priority,
    /// Epoch the task was created under. Stale tasks are dropped.
    pub epoch: u64,
}

#[derive(Debug)]
struct Entry {
    task: ScanTask,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then the lower sequence number.
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

/// Concurrent priority queue with blocking pop.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Returns `false` once the queue has been shut down.
    pub fn push(&self, task: ScanTask) -> bool {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry { task, seq });
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Block until a task is available. Returns `None` after shutdown.
    pub fn pop_blocking(&self) -> Option<ScanTask> {
        let mut inner = self.inner.lock();
        loop {
            if inner.shutdown {
                return None;
            }
            if let Some(entry) = inner.heap.pop() {
                return Some(entry.task);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<ScanTask> {
        self.inner.lock().heap.pop().map(|e| e.task)
    }

    /// Drop every pending task and return how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.heap.len();
        inner.heap.clear();
        removed
    }

    /// Wake all workers and make them exit.
    pub fn shutdown(&self) {
        self.inner.lock().shutdown = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
