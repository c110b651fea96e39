/// Scan tasks: directory listing and file comparison.
///
/// The same functions run on pool threads (from the queue) and on the UI
/// thread (on-demand expansion). Each task follows the same shape:
///
/// 1. **Claim** the node under its lock (epoch-gated), copying out what the
///    task needs.
/// 2. **I/O** through the providers with no locks held.
/// 3. **Commit** the result under the epoch gate: write the node, propagate
///    the change to its ancestors, enqueue follow-up work. A stale epoch
///    drops the result without touching the tree.
use super::queue::{Priority, ScanTask, TaskKind};
use super::SessionInner;
use super::stats::Counters;
use crate::engine::{
    self, apply_child_transition, observe, settle_directory, ChildDiff, FollowUp, Side,
    Transition,
};
use crate::error::{ErrorKind, ProviderError};
use crate::model::{
    ChildTally, DiffNode, DiffStatus, ErrorInfo, NodeIndex, Presence, ScanState, SideMeta,
};
use crate::provider::{ContentReader, EntryMeta};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Body of every pool thread.
pub(crate) fn run_worker_loop(inner: Arc<SessionInner>) {
    while let Some(task) = inner.queue.pop_blocking() {
        if task.epoch != inner.current_epoch() {
            debug!("Dropping stale task for {:?} (epoch {})", task.node, task.epoch);
            continue;
        }
        inner.active.fetch_add(1, Ordering::AcqRel);
        match task.kind {
            TaskKind::ListDirectory => scan_directory(&inner, task.node, task.epoch, task.priority),
            TaskKind::CompareFiles => compare_pair(&inner, task.node, task.epoch),
        }
        inner.active.fetch_sub(1, Ordering::AcqRel);
        inner.note_progress();
    }
    debug!("Worker exiting");
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

/// Record a committed failure: bump the error counter and remember dead
/// backends.
fn note_error(inner: &SessionInner, err: &ProviderError, side: Option<Side>) -> ErrorInfo {
    Counters::add(&inner.counters.errors, 1);
    if err.kind == ErrorKind::ProviderUnavailable {
        if let Some(side) = side {
            inner.mark_unavailable(side);
        }
    }
    ErrorInfo::new(err.kind, err.to_string())
}

fn unavailable_error(inner: &SessionInner, side: Side, raw_path: &Path) -> ProviderError {
    ProviderError::new(
        ErrorKind::ProviderUnavailable,
        inner.side_path(side, raw_path),
        format!("{} backend is unavailable", inner.provider(side).name()),
    )
}

/// Fold a node's transition into each ancestor in turn, stopping at the
/// first ancestor whose own observable state did not change.
pub(crate) fn propagate(inner: &SessionInner, from: NodeIndex, transition: Transition) {
    let mut current = from;
    let mut transition = transition;
    while !transition.is_empty() {
        let Some(parent) = inner.tree.read(current, |n| n.parent).flatten() else {
            break;
        };
        transition = inner
            .tree
            .mutate(parent, |p| apply_child_transition(p, transition))
            .unwrap_or_default();
        current = parent;
    }
}

/// Children may only be worked on once their parent's listing is committed
/// in the current epoch; otherwise the parent's tally could count a child's
/// transition twice.
pub(crate) fn parent_listed(inner: &SessionInner, index: NodeIndex) -> bool {
    match inner.tree.read(index, |n| n.parent).flatten() {
        Some(parent) => inner.tree.read(parent, |p| p.listed).unwrap_or(false),
        None => true,
    }
}

// ─── Root presence ─────────────────────────────────────────────────────────

/// The root's kind on each side is unknown until stat'ed. Returns the
/// refined root kind, or `None` if the result was discarded.
fn resolve_root(inner: &SessionInner, epoch: u64) -> Option<(Presence, Presence)> {
    let mut presence = [Presence::Absent; 2];
    let mut meta = [SideMeta::default(); 2];
    let mut failure: Option<(ProviderError, Side)> = None;

    for (i, side) in [Side::Left, Side::Right].into_iter().enumerate() {
        if inner.is_unavailable(side) {
            failure.get_or_insert((unavailable_error(inner, side, Path::new("")), side));
            continue;
        }
        let path = inner.side_path(side, Path::new(""));
        match inner.provider(side).stat(&path) {
            Ok(entry) => {
                presence[i] = Presence::from(entry.kind);
                meta[i] = SideMeta {
                    size: entry.size,
                    modified: entry.modified,
                };
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!("Cannot stat comparison root {}: {err}", path.display());
                failure.get_or_insert((err, side));
            }
        }
    }

    inner.commit(epoch, || {
        let transition = inner.tree.mutate(NodeIndex::ROOT, |root| {
            if root.listed || root.scan_state == ScanState::Done {
                return None;
            }
            let before = observe(root);
            root.left = presence[0];
            root.right = presence[1];
            root.left_meta = meta[0];
            root.right_meta = meta[1];
            if let Some((err, side)) = &failure {
                root.set_error(note_error(inner, err, Some(*side)));
                root.listed = true;
            } else if !root.left.is_present() && !root.right.is_present() {
                let err = ProviderError::new(
                    ErrorKind::NotFound,
                    inner.side_path(Side::Left, Path::new("")),
                    "neither comparison root exists",
                );
                root.set_error(note_error(inner, &err, None));
                root.listed = true;
            } else if root.is_type_mismatch() {
                root.status = DiffStatus::ContentDifferent;
                root.scan_state = ScanState::Done;
            } else if root.is_one_sided() {
                root.status = if root.left.is_present() {
                    DiffStatus::OnlyLeft
                } else {
                    DiffStatus::OnlyRight
                };
                if !root.is_container() {
                    root.scan_state = ScanState::Done;
                }
            }
            Some(Transition::between(before, observe(root)))
        });
        if let Some(t) = transition.flatten() {
            propagate(inner, NodeIndex::ROOT, t);
        }
        (presence[0], presence[1])
    })
}

// ─── Directory listing ─────────────────────────────────────────────────────

struct ListClaim {
    relative_path: String,
    raw_path: PathBuf,
    depth: u16,
    parent: Option<NodeIndex>,
    left: Presence,
    right: Presence,
}

/// Outcome of listing one side.
enum SideListing {
    Listed {
        entries: Vec<EntryMeta>,
        real: Option<PathBuf>,
    },
    /// The side has no directory here (absent, or vanished since discovery).
    Absent,
}

/// List the directory at `index` and commit its children.
///
/// Used by pool workers and by on-demand expansion; safe to run twice for
/// the same node, the second commit is dropped.
pub(crate) fn scan_directory(inner: &SessionInner, index: NodeIndex, epoch: u64, priority: Priority) {
    if index == NodeIndex::ROOT {
        let needs_root = inner
            .tree
            .read(index, |n| !n.listed && n.scan_state < ScanState::Done)
            .unwrap_or(false);
        if needs_root {
            match resolve_root(inner, epoch) {
                Some((Presence::File, Presence::File)) => {
                    compare_pair(inner, index, epoch);
                    return;
                }
                Some(_) => {}
                None => return,
            }
        }
    }

    let claim = inner
        .commit(epoch, || {
            if !parent_listed(inner, index) {
                return None;
            }
            inner.tree.mutate(index, |n| {
                if n.listed || !n.is_container() || n.status == DiffStatus::Error {
                    return None;
                }
                if n.scan_state < ScanState::InProgress {
                    n.scan_state = ScanState::InProgress;
                }
                if n.status == DiffStatus::Pending {
                    n.status = DiffStatus::Scanning;
                }
                Some(ListClaim {
                    relative_path: n.relative_path.clone(),
                    raw_path: n.raw_path.clone(),
                    depth: n.depth,
                    parent: n.parent,
                    left: n.left,
                    right: n.right,
                })
            })
        })
        .flatten()
        .flatten();
    let Some(claim) = claim else {
        return;
    };

    debug!("Listing '{}'", claim.relative_path);

    // Real paths of every ancestor, per side, for the cycle guard.
    let ancestry: Vec<(Option<PathBuf>, Option<PathBuf>)> = claim
        .parent
        .map(|p| inner.tree.ancestors(p))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| inner.tree.read(a, |n| (n.left_real.clone(), n.right_real.clone())))
        .collect();

    let mut failure: Option<(ProviderError, Side)> = None;
    let mut listings: Vec<SideListing> = Vec::with_capacity(2);
    for side in [Side::Left, Side::Right] {
        let presence = if side == Side::Left { claim.left } else { claim.right };
        if failure.is_some() || !presence.is_dir_like() {
            listings.push(SideListing::Absent);
            continue;
        }
        match list_side(inner, side, &claim.raw_path, &ancestry) {
            Ok(listing) => listings.push(listing),
            Err(err) => {
                warn!("Listing failed: {err}");
                failure = Some((err, side));
                listings.push(SideListing::Absent);
            }
        }
    }

    let right_listing = listings.pop().unwrap_or(SideListing::Absent);
    let left_listing = listings.pop().unwrap_or(SideListing::Absent);
    let (left_entries, left_real, left_gone) = split_listing(left_listing, claim.left);
    let (right_entries, right_real, right_gone) = split_listing(right_listing, claim.right);

    let children = if failure.is_none() {
        engine::compare_directory(&left_entries, &right_entries)
    } else {
        BTreeMap::new()
    };

    inner.commit(epoch, || {
        let mut follow_ups: Vec<(NodeIndex, TaskKind)> = Vec::new();
        let transition = inner
            .tree
            .mutate(index, |node| {
                if node.listed {
                    return None;
                }
                let before = observe(node);
                node.left_real = left_real.clone();
                node.right_real = right_real.clone();

                if let Some((err, side)) = &failure {
                    node.set_error(note_error(inner, err, Some(*side)));
                    node.listed = true;
                    return Some(Transition::between(before, observe(node)));
                }

                if left_gone {
                    node.left = Presence::Absent;
                }
                if right_gone {
                    node.right = Presence::Absent;
                }
                if left_gone || right_gone {
                    let settled = node.status.is_final();
                    match (node.left.is_present(), node.right.is_present()) {
                        (true, false) if !settled => node.status = DiffStatus::OnlyLeft,
                        (false, true) if !settled => node.status = DiffStatus::OnlyRight,
                        (false, false) if node.parent.is_some() => {
                            debug!("'{}' vanished on both sides", claim.relative_path);
                            node.mark_vanished();
                            node.listed = true;
                            return Some(Transition::between(before, observe(node)));
                        }
                        (false, false) => {
                            let err = ProviderError::new(
                                ErrorKind::NotFound,
                                inner.side_path(Side::Left, &claim.raw_path),
                                "comparison root vanished on both sides",
                            );
                            node.set_error(note_error(inner, &err, None));
                            node.listed = true;
                            return Some(Transition::between(before, observe(node)));
                        }
                        _ => {}
                    }
                }

                node.tally = merge_children(inner, index, node, &claim, &children, &mut follow_ups);
                node.listed = true;
                settle_directory(node);
                if node.status.is_final() {
                    node.scan_state = ScanState::Done;
                }
                Some(Transition::between(before, observe(node)))
            })
            .flatten();

        let Some(transition) = transition else {
            debug!("Listing of '{}' already committed", claim.relative_path);
            return;
        };
        Counters::add(&inner.counters.dirs_listed, 1);
        propagate(inner, index, transition);

        let child_priority = priority.lower();
        for (node, kind) in follow_ups {
            inner.queue.push(ScanTask {
                node,
                kind,
                priority: child_priority,
                epoch,
            });
        }
    });
}

fn list_side(
    inner: &SessionInner,
    side: Side,
    raw_path: &Path,
    ancestry: &[(Option<PathBuf>, Option<PathBuf>)],
) -> Result<SideListing, ProviderError> {
    if inner.is_unavailable(side) {
        return Err(unavailable_error(inner, side, raw_path));
    }
    let provider = inner.provider(side);
    let path = inner.side_path(side, raw_path);

    let real = match provider.real_path(&path) {
        Ok(real) => Some(real),
        Err(err) if err.is_not_found() => return Ok(SideListing::Absent),
        Err(err) if err.kind == ErrorKind::ProviderUnavailable => return Err(err),
        Err(_) => None,
    };
    if let Some(real) = &real {
        let seen = ancestry.iter().any(|(l, r)| {
            let ancestor = if side == Side::Left { l } else { r };
            ancestor.as_ref() == Some(real)
        });
        if seen {
            return Err(ProviderError::new(
                ErrorKind::CyclicLink,
                path,
                format!("link cycle back to {}", real.display()),
            ));
        }
    }

    match provider.list(&path) {
        Ok(entries) => Ok(SideListing::Listed { entries, real }),
        Err(err) if err.is_not_found() => Ok(SideListing::Absent),
        Err(err) => Err(err),
    }
}

/// Returns `(entries, real_path, vanished)`.
fn split_listing(listing: SideListing, presence: Presence) -> (Vec<EntryMeta>, Option<PathBuf>, bool) {
    match listing {
        SideListing::Listed { entries, real } => (entries, real, false),
        SideListing::Absent => (Vec::new(), None, presence.is_dir_like()),
    }
}

fn apply_diff(child: &mut DiffNode, diff: &ChildDiff) {
    child.left = diff.left;
    child.right = diff.right;
    child.left_meta = diff.left_meta;
    child.right_meta = diff.right_meta;
    child.status = diff.status;
    child.error = None;
    child.scan_state = match diff.follow_up {
        FollowUp::None => diff.scan_state,
        FollowUp::ListDirectory | FollowUp::CompareContent => ScanState::Queued,
    };
    // Children from an earlier epoch survive only under directories that
    // will be listed again.
    if diff.follow_up != FollowUp::ListDirectory {
        child.children.clear();
    }
}

/// Create or update every child named by the listing, settle vanished
/// ones, and return the fresh tally. Runs with the parent locked.
///
/// A vanished child keeps its slot and index but leaves the tally, so a
/// directory whose extra entries were deleted on both sides reads
/// `Identical` again.
fn merge_children(
    inner: &SessionInner,
    parent_index: NodeIndex,
    parent: &mut DiffNode,
    claim: &ListClaim,
    children: &BTreeMap<OsString, ChildDiff>,
    follow_ups: &mut Vec<(NodeIndex, TaskKind)>,
) -> ChildTally {
    let mut tally = ChildTally::default();
    let mut count = |seen: engine::Observed| {
        if !seen.done {
            tally.pending += 1;
        }
        if seen.different {
            tally.differing += 1;
        }
    };

    for (raw_name, diff) in children {
        let existing = parent.children.get(raw_name).copied();
        let (child_index, seen) = match existing {
            Some(child_index) => {
                let seen = inner
                    .tree
                    .mutate_nested(child_index, |child| {
                        apply_diff(child, diff);
                        observe(child)
                    });
                match seen {
                    Some(seen) => (child_index, seen),
                    None => continue,
                }
            }
            None => {
                let mut child = DiffNode::new_child(
                    diff.name.clone(),
                    child_path(&claim.relative_path, &diff.name),
                    Some(parent_index),
                    claim.depth.saturating_add(1),
                );
                child.raw_path = claim.raw_path.join(raw_name);
                apply_diff(&mut child, diff);
                let seen = observe(&child);
                let child_index = inner.tree.insert(child);
                parent.children.insert(raw_name.clone(), child_index);
                (child_index, seen)
            }
        };
        count(seen);

        match diff.follow_up {
            FollowUp::ListDirectory => follow_ups.push((child_index, TaskKind::ListDirectory)),
            FollowUp::CompareContent => follow_ups.push((child_index, TaskKind::CompareFiles)),
            FollowUp::None => {}
        }
    }

    // Entries from an earlier epoch that are gone on both sides now.
    let vanished: Vec<NodeIndex> = parent
        .children
        .iter()
        .filter(|(name, _)| !children.contains_key(*name))
        .map(|(_, &idx)| idx)
        .collect();
    for child_index in vanished {
        inner.tree.mutate_nested(child_index, |child| {
            if !child.is_vanished() {
                debug!("'{}' vanished on both sides", child.relative_path);
            }
            child.mark_vanished();
        });
    }

    tally
}

// ─── File comparison ───────────────────────────────────────────────────────

/// Byte-compare one pair, keeping one handle open per side for the whole
/// run. Handles are opened on first read, so a size mismatch opens nothing.
/// Records which side failed, if any.
fn compare_contents(
    inner: &SessionInner,
    raw_path: &Path,
    left_meta: &SideMeta,
    right_meta: &SideMeta,
    failed_side: &mut Option<Side>,
) -> Result<engine::FileVerdict, ProviderError> {
    let mut readers: [Option<Box<dyn ContentReader + '_>>; 2] = [None, None];
    engine::compare_file(left_meta, right_meta, inner.config.chunk_size, |side, offset, len| {
        let slot = &mut readers[side as usize];
        let reader = match slot {
            Some(reader) => reader,
            None => {
                let path = inner.side_path(side, raw_path);
                let opened = inner
                    .provider(side)
                    .open(&path)
                    .inspect_err(|_| *failed_side = Some(side))?;
                slot.insert(opened)
            }
        };
        reader.read_at(offset, len).inspect_err(|_| *failed_side = Some(side))
    })
}

/// Byte-compare the file pair at `index` and commit the verdict.
pub(crate) fn compare_pair(inner: &SessionInner, index: NodeIndex, epoch: u64) {
    let claim = inner
        .commit(epoch, || {
            if !parent_listed(inner, index) {
                return None;
            }
            inner.tree.mutate(index, |n| {
                if n.scan_state == ScanState::Done
                    || n.left != Presence::File
                    || n.right != Presence::File
                {
                    return None;
                }
                n.scan_state = ScanState::InProgress;
                n.status = DiffStatus::Scanning;
                Some((n.relative_path.clone(), n.raw_path.clone(), n.left_meta, n.right_meta))
            })
        })
        .flatten()
        .flatten();
    let Some((relative_path, raw_path, left_meta, right_meta)) = claim else {
        return;
    };

    let mut failed_side = None;
    let verdict = if let Some(side) = [Side::Left, Side::Right]
        .into_iter()
        .find(|&s| inner.is_unavailable(s))
    {
        failed_side = Some(side);
        Err(unavailable_error(inner, side, &raw_path))
    } else {
        compare_contents(inner, &raw_path, &left_meta, &right_meta, &mut failed_side)
    };

    inner.commit(epoch, || {
        let transition = inner
            .tree
            .mutate(index, |n| {
                if n.scan_state == ScanState::Done {
                    return None;
                }
                let before = observe(n);
                match &verdict {
                    Ok(v) => {
                        n.status = v.status;
                        n.scan_state = ScanState::Done;
                    }
                    Err(err) => {
                        warn!("Comparing '{relative_path}' failed: {err}");
                        n.set_error(note_error(inner, err, failed_side));
                    }
                }
                Some(Transition::between(before, observe(n)))
            })
            .flatten();

        if let Some(transition) = transition {
            Counters::add(&inner.counters.files_compared, 1);
            if let Ok(v) = &verdict {
                Counters::add(&inner.counters.bytes_compared, v.bytes_compared);
            }
            propagate(inner, index, transition);
        }
    });
}
