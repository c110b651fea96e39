/// A single entry in the unified two-sided comparison tree.
///
/// Nodes live in the arena owned by [`TreeStore`](super::TreeStore).
/// Parent and child links use [`NodeIndex`] rather than pointers, which keeps
/// cycle-guard bookkeeping to plain integer comparisons and lets readers
/// hold on to a node identity without borrowing the tree.
use crate::error::ErrorKind;
use crate::provider::EntryKind;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::SystemTime;

/// Lightweight index into the node arena.
///
/// Uses `u32` to keep nodes small: supports up to ~4 billion nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// The comparison root is always the first arena slot.
    pub const ROOT: NodeIndex = NodeIndex(0);

    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// What exists at a node's path on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Absent,
    File,
    Directory,
    SymlinkDir,
}

impl Presence {
    #[inline]
    pub fn is_present(self) -> bool {
        self != Presence::Absent
    }

    #[inline]
    pub fn is_dir_like(self) -> bool {
        matches!(self, Presence::Directory | Presence::SymlinkDir)
    }
}

impl From<EntryKind> for Presence {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Presence::File,
            EntryKind::Directory => Presence::Directory,
            EntryKind::SymlinkDir => Presence::SymlinkDir,
        }
    }
}

/// Comparison outcome of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    /// Discovered, not yet looked at.
    Pending,
    /// Work on this node (or below it) is under way and no difference has
    /// been found so far.
    Scanning,
    Identical,
    OnlyLeft,
    OnlyRight,
    ContentDifferent,
    /// The directory itself matches but a descendant differs.
    ContainsDifference,
    Error,
}

impl DiffStatus {
    /// `true` for every definite, non-identical outcome. `Pending` and
    /// `Scanning` are not differences: nothing is known yet.
    #[inline]
    pub fn is_difference(self) -> bool {
        match self {
            DiffStatus::OnlyLeft
            | DiffStatus::OnlyRight
            | DiffStatus::ContentDifferent
            | DiffStatus::ContainsDifference
            | DiffStatus::Error => true,
            DiffStatus::Pending | DiffStatus::Scanning | DiffStatus::Identical => false,
        }
    }

    /// Statuses that can never change again within an epoch.
    #[inline]
    pub fn is_final(self) -> bool {
        match self {
            DiffStatus::Identical
            | DiffStatus::OnlyLeft
            | DiffStatus::OnlyRight
            | DiffStatus::ContentDifferent
            | DiffStatus::Error => true,
            DiffStatus::Pending | DiffStatus::Scanning | DiffStatus::ContainsDifference => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DiffStatus::Pending => "pending",
            DiffStatus::Scanning => "scanning",
            DiffStatus::Identical => "identical",
            DiffStatus::OnlyLeft => "only left",
            DiffStatus::OnlyRight => "only right",
            DiffStatus::ContentDifferent => "different",
            DiffStatus::ContainsDifference => "contains difference",
            DiffStatus::Error => "error",
        }
    }
}

/// Per-node scan progress. Ordered so that `a <= b` means `b` is the same
/// or a later stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    NotScanned,
    Queued,
    InProgress,
    Done,
}

/// A node-local failure. Never fatal to the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Metadata observed for one side of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideMeta {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Running counts over a directory's direct children, maintained
/// incrementally so propagation is O(depth) instead of O(width × depth).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildTally {
    /// Children whose `scan_state` is not yet `Done`.
    pub pending: u32,
    /// Children whose status is a definite difference.
    pub differing: u32,
}

/// One file or directory in the comparison tree.
#[derive(Debug, Clone)]
pub struct DiffNode {
    /// Basename only. The root's name is empty.
    pub name: CompactString,

    /// `/`-separated path from the comparison root, for display and lookup.
    pub relative_path: String,

    /// The same path built from raw names. Only this is joined onto the
    /// roots, so names that are not UTF-8 still resolve.
    pub raw_path: PathBuf,

    pub parent: Option<NodeIndex>,

    /// Nesting depth (root = 0).
    pub depth: u16,

    pub left: Presence,
    pub right: Presence,
    pub left_meta: SideMeta,
    pub right_meta: SideMeta,

    pub status: DiffStatus,
    pub scan_state: ScanState,

    /// Children keyed by raw name. `BTreeMap` keeps byte-wise
    /// (case-sensitive) lexicographic order stable across re-renders.
    pub children: BTreeMap<OsString, NodeIndex>,

    /// `true` once this directory's listing has been committed. Separate
    /// from `scan_state`, which only reaches `Done` when the whole subtree
    /// has settled.
    pub listed: bool,

    pub tally: ChildTally,

    pub error: Option<ErrorInfo>,

    /// Canonical identities recorded when the directory was listed, used to
    /// detect symlink cycles below it.
    pub left_real: Option<PathBuf>,
    pub right_real: Option<PathBuf>,

    /// Global version at the last mutation of this node or a descendant.
    pub version: u64,
}

impl DiffNode {
    /// The comparison root. Presence is refined by the first scan task.
    pub fn new_root() -> Self {
        Self::new_child(CompactString::default(), String::new(), None, 0)
    }

    /// A freshly discovered node with nothing known yet.
    pub fn new_child(
        name: CompactString,
        relative_path: String,
        parent: Option<NodeIndex>,
        depth: u16,
    ) -> Self {
        Self {
            name,
            raw_path: PathBuf::from(&relative_path),
            relative_path,
            parent,
            depth,
            left: Presence::Directory,
            right: Presence::Directory,
            left_meta: SideMeta::default(),
            right_meta: SideMeta::default(),
            status: DiffStatus::Pending,
            scan_state: ScanState::NotScanned,
            children: BTreeMap::new(),
            listed: false,
            tally: ChildTally::default(),
            error: None,
            left_real: None,
            right_real: None,
            version: 0,
        }
    }

    /// Present on exactly one side.
    #[inline]
    pub fn is_one_sided(&self) -> bool {
        self.left.is_present() != self.right.is_present()
    }

    /// File on one side, directory on the other.
    #[inline]
    pub fn is_type_mismatch(&self) -> bool {
        self.left.is_present()
            && self.right.is_present()
            && self.left.is_dir_like() != self.right.is_dir_like()
    }

    /// Can be expanded: a directory on every side where it exists.
    #[inline]
    pub fn is_container(&self) -> bool {
        (self.left.is_dir_like() || self.right.is_dir_like()) && !self.is_type_mismatch()
    }

    /// A container whose children or subtree are not fully known yet.
    #[inline]
    pub fn has_children_pending(&self) -> bool {
        self.is_container() && self.status != DiffStatus::Error && (!self.listed || self.tally.pending > 0)
    }

    /// Fully settled, including the whole subtree for directories.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.scan_state == ScanState::Done
    }

    /// Gone from both sides since it was discovered. The node is kept so
    /// its index stays valid, but it no longer takes part in the comparison:
    /// it is not shown, counted or tallied.
    #[inline]
    pub fn is_vanished(&self) -> bool {
        self.parent.is_some() && !self.left.is_present() && !self.right.is_present()
    }

    /// Settle a node whose entry disappeared from both sides.
    pub fn mark_vanished(&mut self) {
        self.left = Presence::Absent;
        self.right = Presence::Absent;
        self.left_meta = SideMeta::default();
        self.right_meta = SideMeta::default();
        self.status = DiffStatus::Identical;
        self.scan_state = ScanState::Done;
        self.error = None;
        self.children.clear();
    }

    /// Reset to the undiscovered state for a forced rescan. Children stay
    /// attached so the UI cursor keeps its place.
    pub fn reset_for_rescan(&mut self) {
        if self.is_vanished() {
            return;
        }
        self.status = DiffStatus::Pending;
        self.scan_state = ScanState::NotScanned;
        self.listed = false;
        self.tally = ChildTally::default();
        self.error = None;
        self.left_real = None;
        self.right_real = None;
    }

    /// Record a failure and settle the node.
    pub fn set_error(&mut self, info: ErrorInfo) {
        self.status = DiffStatus::Error;
        self.scan_state = ScanState::Done;
        self.error = Some(info);
    }
}
