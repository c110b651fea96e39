/// Visible-row projection.
///
/// Flattens the comparison tree into the ordered rows a renderer draws,
/// descending only into expanded directories. The traversal touches one node
/// lock at a time, so a projection taken while workers are committing is a
/// point-in-time view that may lag the tree by one frame.
use crate::model::{DiffNode, DiffStatus, NodeIndex, Presence, TreeStore};
use compact_str::CompactString;
use std::collections::HashSet;

/// One row in the flattened list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    /// Index into the tree arena.
    pub node: NodeIndex,
    /// Indentation level; children of the projected root are at 0.
    pub depth: u16,
    pub name: CompactString,
    pub status: DiffStatus,
    pub left: Presence,
    pub right: Presence,
    /// Directory that can be expanded.
    pub is_container: bool,
    pub is_expanded: bool,
    /// Children or grandchildren still being discovered, so the renderer can
    /// draw a spinner next to the row.
    pub has_children_pending: bool,
}

/// Whether the "hide identical" filter removes this node.
///
/// A directory is only hidden once its whole subtree is done; an identical
/// directory still being scanned may yet turn out to differ.
#[inline]
pub fn is_hidden(node: &DiffNode, hide_identical: bool) -> bool {
    hide_identical
        && node.status == DiffStatus::Identical
        && (!node.is_container() || node.is_done())
}

/// Flatten the subtree under `root` (exclusive) into visible rows.
///
/// Iterative depth-first traversal in name order. Cost is proportional to
/// the rows produced plus the children of expanded directories, independent
/// of how much of the tree lies under collapsed nodes. Output is capped at
/// `max_rows`.
pub fn project(
    tree: &TreeStore,
    root: NodeIndex,
    expanded: &HashSet<NodeIndex>,
    hide_identical: bool,
    max_rows: usize,
) -> Vec<VisibleRow> {
    let mut rows = Vec::new();
    let mut stack: Vec<(NodeIndex, u16)> =
        tree.children(root).into_iter().rev().map(|c| (c, 0)).collect();

    while let Some((index, depth)) = stack.pop() {
        if rows.len() >= max_rows {
            break;
        }
        let visited = tree.read(index, |node| {
            if node.is_vanished() || is_hidden(node, hide_identical) {
                return None;
            }
            let is_expanded = node.is_container() && expanded.contains(&index);
            let children: Vec<NodeIndex> = if is_expanded {
                node.children.values().copied().collect()
            } else {
                Vec::new()
            };
            let row = VisibleRow {
                node: index,
                depth,
                name: node.name.clone(),
                status: node.status,
                left: node.left,
                right: node.right,
                is_container: node.is_container(),
                is_expanded,
                has_children_pending: node.has_children_pending(),
            };
            Some((row, children))
        });
        let Some(Some((row, children))) = visited else {
            continue;
        };
        rows.push(row);
        stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanState;
    use std::ffi::OsString;

    fn add(
        tree: &TreeStore,
        parent: NodeIndex,
        name: &str,
        status: DiffStatus,
        dir: bool,
        done: bool,
    ) -> NodeIndex {
        let (path, depth) = tree
            .read(parent, |p| {
                let path = if p.relative_path.is_empty() {
                    name.to_owned()
                } else {
                    format!("{}/{name}", p.relative_path)
                };
                (path, p.depth + 1)
            })
            .unwrap();
        let mut node = DiffNode::new_child(CompactString::new(name), path, Some(parent), depth);
        if !dir {
            node.left = Presence::File;
            node.right = Presence::File;
        }
        node.listed = dir && done;
        node.status = status;
        node.scan_state = if done { ScanState::Done } else { ScanState::InProgress };
        let index = tree.insert(node);
        tree.mutate(parent, |p| {
            p.children.insert(OsString::from(name), index);
        });
        index
    }

    fn names(rows: &[VisibleRow]) -> Vec<(&str, u16)> {
        rows.iter().map(|r| (r.name.as_str(), r.depth)).collect()
    }

    #[test]
    fn collapsed_directories_hide_their_children() {
        let tree = TreeStore::new();
        let dir = add(&tree, NodeIndex::ROOT, "dir", DiffStatus::ContainsDifference, true, true);
        add(&tree, dir, "inner.txt", DiffStatus::ContentDifferent, false, true);
        add(&tree, NodeIndex::ROOT, "a.txt", DiffStatus::Identical, false, true);

        let rows = project(&tree, NodeIndex::ROOT, &HashSet::new(), false, usize::MAX);
        assert_eq!(names(&rows), vec![("a.txt", 0), ("dir", 0)]);
        assert!(rows[1].is_container);
        assert!(!rows[1].is_expanded);

        let expanded: HashSet<_> = [dir].into_iter().collect();
        let rows = project(&tree, NodeIndex::ROOT, &expanded, false, usize::MAX);
        assert_eq!(names(&rows), vec![("a.txt", 0), ("dir", 0), ("inner.txt", 1)]);
        assert!(rows[1].is_expanded);
    }

    #[test]
    fn hide_identical_keeps_directories_still_scanning() {
        let tree = TreeStore::new();
        add(&tree, NodeIndex::ROOT, "same.txt", DiffStatus::Identical, false, true);
        add(&tree, NodeIndex::ROOT, "done_dir", DiffStatus::Identical, true, true);
        let busy = add(&tree, NodeIndex::ROOT, "busy_dir", DiffStatus::Scanning, true, false);
        add(&tree, NodeIndex::ROOT, "diff.txt", DiffStatus::ContentDifferent, false, true);

        let rows = project(&tree, NodeIndex::ROOT, &HashSet::new(), true, usize::MAX);
        assert_eq!(names(&rows), vec![("busy_dir", 0), ("diff.txt", 0)]);
        assert!(rows[0].has_children_pending);

        // An identical directory whose subtree is not done yet stays visible.
        tree.mutate(busy, |n| n.status = DiffStatus::Identical);
        let rows = project(&tree, NodeIndex::ROOT, &HashSet::new(), true, usize::MAX);
        assert_eq!(names(&rows), vec![("busy_dir", 0), ("diff.txt", 0)]);
    }

    #[test]
    fn expanded_set_inside_collapsed_parent_is_not_visited() {
        let tree = TreeStore::new();
        let outer = add(&tree, NodeIndex::ROOT, "outer", DiffStatus::Identical, true, true);
        let inner = add(&tree, outer, "inner", DiffStatus::Identical, true, true);
        add(&tree, inner, "deep.txt", DiffStatus::Identical, false, true);

        let expanded: HashSet<_> = [inner].into_iter().collect();
        let rows = project(&tree, NodeIndex::ROOT, &expanded, false, usize::MAX);
        assert_eq!(names(&rows), vec![("outer", 0)]);
    }

    #[test]
    fn entries_gone_from_both_sides_are_never_shown() {
        let tree = TreeStore::new();
        add(&tree, NodeIndex::ROOT, "kept.txt", DiffStatus::ContentDifferent, false, true);
        let gone = add(&tree, NodeIndex::ROOT, "gone.txt", DiffStatus::Identical, false, true);
        tree.mutate(gone, DiffNode::mark_vanished);

        for hide in [false, true] {
            let rows = project(&tree, NodeIndex::ROOT, &HashSet::new(), hide, usize::MAX);
            assert_eq!(names(&rows), vec![("kept.txt", 0)]);
        }
    }

    #[test]
    fn row_cap_truncates_output() {
        let tree = TreeStore::new();
        for i in 0..10 {
            add(&tree, NodeIndex::ROOT, &format!("f{i}"), DiffStatus::Identical, false, true);
        }
        let rows = project(&tree, NodeIndex::ROOT, &HashSet::new(), false, 4);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].name, "f0");
    }
}
