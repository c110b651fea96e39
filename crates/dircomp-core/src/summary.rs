/// Whole-tree difference statistics for the status line and reports.
use crate::model::{DiffStatus, NodeIndex, TreeStore};
use serde::Serialize;

/// Node counts per status, excluding the comparison root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub only_left: u64,
    pub only_right: u64,
    pub content_different: u64,
    pub identical: u64,
    pub contains_difference: u64,
    pub errors: u64,
    /// Nodes still `Pending` or `Scanning`.
    pub unresolved: u64,
}

impl DiffSummary {
    /// Count every node reachable from the root, skipping entries gone from
    /// both sides. O(n); callers recompute only when the tree version
    /// changes.
    pub fn collect(tree: &TreeStore) -> Self {
        let mut summary = Self::default();
        let mut stack = tree.children(NodeIndex::ROOT);
        while let Some(index) = stack.pop() {
            let status = tree.read(index, |node| {
                stack.extend(node.children.values().copied());
                (!node.is_vanished()).then_some(node.status)
            });
            if let Some(Some(status)) = status {
                summary.record(status);
            }
        }
        summary
    }

    fn record(&mut self, status: DiffStatus) {
        match status {
            DiffStatus::OnlyLeft => self.only_left += 1,
            DiffStatus::OnlyRight => self.only_right += 1,
            DiffStatus::ContentDifferent => self.content_different += 1,
            DiffStatus::Identical => self.identical += 1,
            DiffStatus::ContainsDifference => self.contains_difference += 1,
            DiffStatus::Error => self.errors += 1,
            DiffStatus::Pending | DiffStatus::Scanning => self.unresolved += 1,
        }
    }

    /// Leaf-level differences (directories that merely contain one are not
    /// counted twice).
    pub fn differences(&self) -> u64 {
        self.only_left + self.only_right + self.content_different
    }

    /// Compact status-line text, e.g. `Left:2 Right:1 Diff:4 Same:10 Errors:1`.
    ///
    /// Zero counts are omitted; with nothing to report the text reads
    /// `No differences`.
    pub fn status_text(&self) -> String {
        let parts: Vec<String> = [
            ("Left", self.only_left),
            ("Right", self.only_right),
            ("Diff", self.content_different),
            ("Same", self.identical),
        ]
        .into_iter()
        .filter(|&(_, n)| n > 0)
        .map(|(label, n)| format!("{label}:{n}"))
        .collect();

        let mut text = if parts.is_empty() {
            "No differences".to_owned()
        } else {
            parts.join(" ")
        };
        if self.errors > 0 {
            text.push_str(&format!(" Errors:{}", self.errors));
        }
        text
    }
}
