/// Diff engine: pure comparison and status-propagation logic.
///
/// Nothing in here touches threads, locks or providers directly. The
/// scheduler feeds it raw listings and a chunk reader, and applies the
/// results to the tree store under the appropriate node locks.
use crate::error::ProviderError;
use crate::model::{DiffNode, DiffStatus, Presence, ScanState, SideMeta};
use crate::provider::EntryMeta;
use compact_str::CompactString;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Which side of the comparison an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Work still required for a child after its parent has been listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// The child is already final.
    None,
    /// Directory on both sides: list it.
    ListDirectory,
    /// Equal-sized files: compare bytes.
    CompareContent,
}

/// Classification of one name from a pair of directory listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDiff {
    /// Display name; the map key holds the raw one.
    pub name: CompactString,
    pub left: Presence,
    pub right: Presence,
    pub left_meta: SideMeta,
    pub right_meta: SideMeta,
    pub status: DiffStatus,
    pub scan_state: ScanState,
    pub follow_up: FollowUp,
}

fn side(entry: Option<&EntryMeta>) -> (Presence, SideMeta) {
    match entry {
        Some(e) => (
            Presence::from(e.kind),
            SideMeta {
                size: e.size,
                modified: e.modified,
            },
        ),
        None => (Presence::Absent, SideMeta::default()),
    }
}

/// Classify a single name given what each side holds.
pub fn classify_entry(left: Option<&EntryMeta>, right: Option<&EntryMeta>) -> ChildDiff {
    let (left_presence, left_meta) = side(left);
    let (right_presence, right_meta) = side(right);

    let settled = |status| (status, ScanState::Done, FollowUp::None);
    let (status, scan_state, follow_up) = match (left, right) {
        (Some(_), None) => settled(DiffStatus::OnlyLeft),
        (None, Some(_)) => settled(DiffStatus::OnlyRight),
        (None, None) => settled(DiffStatus::Error),
        (Some(l), Some(r)) => match (l.kind.is_dir_like(), r.kind.is_dir_like()) {
            (true, true) => (DiffStatus::Pending, ScanState::NotScanned, FollowUp::ListDirectory),
            (false, false) if l.size != r.size => settled(DiffStatus::ContentDifferent),
            // Two empty files need no reads.
            (false, false) if l.size == 0 => settled(DiffStatus::Identical),
            (false, false) => (DiffStatus::Pending, ScanState::NotScanned, FollowUp::CompareContent),
            // File on one side, directory on the other: no descent.
            _ => settled(DiffStatus::ContentDifferent),
        },
    };

    let name = left
        .or(right)
        .map(|e| e.name.clone())
        .unwrap_or_default();
    ChildDiff {
        name,
        left: left_presence,
        right: right_presence,
        left_meta,
        right_meta,
        status,
        scan_state,
        follow_up,
    }
}

/// Match two listings by (case-sensitive) raw name.
///
/// The result is ordered by raw name, which is also the display order.
/// Names that are not valid UTF-8 still match only their exact twin.
pub fn compare_directory(left: &[EntryMeta], right: &[EntryMeta]) -> BTreeMap<OsString, ChildDiff> {
    let left_by_name: BTreeMap<&OsStr, &EntryMeta> =
        left.iter().map(|e| (e.raw_name.as_os_str(), e)).collect();
    let right_by_name: BTreeMap<&OsStr, &EntryMeta> =
        right.iter().map(|e| (e.raw_name.as_os_str(), e)).collect();

    let mut out = BTreeMap::new();
    for name in left_by_name.keys().chain(right_by_name.keys()) {
        if out.contains_key(*name) {
            continue;
        }
        let diff = classify_entry(
            left_by_name.get(name).copied(),
            right_by_name.get(name).copied(),
        );
        out.insert(name.to_os_string(), diff);
    }
    out
}

/// Result of a byte-for-byte file comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileVerdict {
    pub status: DiffStatus,
    /// Bytes read from each side before the verdict was reached.
    pub bytes_compared: u64,
}

/// Compare two files of known size.
///
/// Different sizes are rejected without reading. Otherwise both sides are
/// read in `chunk_size` steps through `read(side, offset, len)` until a
/// mismatch or end of file. A size change observed mid-read (short chunk on
/// one side only) counts as a difference.
pub fn compare_file<F>(
    left: &SideMeta,
    right: &SideMeta,
    chunk_size: usize,
    mut read: F,
) -> Result<FileVerdict, ProviderError>
where
    F: FnMut(Side, u64, usize) -> Result<Vec<u8>, ProviderError>,
{
    if left.size != right.size {
        return Ok(FileVerdict {
            status: DiffStatus::ContentDifferent,
            bytes_compared: 0,
        });
    }

    let chunk_size = chunk_size.max(1);
    let mut offset = 0u64;
    loop {
        let l = read(Side::Left, offset, chunk_size)?;
        let r = read(Side::Right, offset, chunk_size)?;
        if l != r {
            return Ok(FileVerdict {
                status: DiffStatus::ContentDifferent,
                bytes_compared: offset + l.len().min(r.len()) as u64,
            });
        }
        if l.is_empty() {
            return Ok(FileVerdict {
                status: DiffStatus::Identical,
                bytes_compared: offset,
            });
        }
        offset += l.len() as u64;
    }
}

/// Change in a node's externally visible state, reported to its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    /// `scan_state` reached `Done`.
    pub became_done: bool,
    /// Status became a definite difference.
    pub became_different: bool,
}

impl Transition {
    #[inline]
    pub fn is_empty(self) -> bool {
        !self.became_done && !self.became_different
    }

    /// Diff two observations taken with [`observe`].
    pub fn between(before: Observed, after: Observed) -> Self {
        Self {
            became_done: !before.done && after.done,
            became_different: !before.different && after.different,
        }
    }
}

/// The two facts a parent tracks about each child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    pub done: bool,
    pub different: bool,
}

#[inline]
pub fn observe(node: &DiffNode) -> Observed {
    Observed {
        done: node.scan_state == ScanState::Done,
        different: node.status.is_difference(),
    }
}

/// Recompute a listed directory's status and scan state from its tally.
///
/// - any differing child ⇒ `ContainsDifference` immediately, even while
///   other children are still pending;
/// - all children done ⇒ `Done`, and `Identical` when none differ;
/// - otherwise `Scanning`.
///
/// Nodes whose status is already final (one-sided, mismatched, error) are
/// left untouched; their listing only adds browsable children.
pub fn settle_directory(node: &mut DiffNode) {
    if !node.listed || node.status.is_final() {
        return;
    }
    let differing = node.tally.differing > 0;
    if node.tally.pending == 0 {
        node.scan_state = ScanState::Done;
        node.status = if differing {
            DiffStatus::ContainsDifference
        } else {
            DiffStatus::Identical
        };
    } else {
        node.scan_state = ScanState::InProgress;
        node.status = if differing {
            DiffStatus::ContainsDifference
        } else {
            DiffStatus::Scanning
        };
    }
}

/// Fold one child's transition into its parent and report the parent's own
/// transition, so the caller can continue up the ancestor chain.
pub fn apply_child_transition(parent: &mut DiffNode, child: Transition) -> Transition {
    if !parent.listed || child.is_empty() {
        return Transition::default();
    }
    let before = observe(parent);
    if child.became_done {
        parent.tally.pending = parent.tally.pending.saturating_sub(1);
    }
    if child.became_different {
        parent.tally.differing += 1;
    }
    settle_directory(parent);
    Transition::between(before, observe(parent))
}
