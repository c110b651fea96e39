/// View state management.
///
/// Centralises the mutable state a renderer reads and writes: the projected
/// rows, cursor, scroll window and status line. The scan runs on worker
/// threads and never calls back into the view; [`DiffViewState::poll`] runs
/// once per frame and re-projects only when the tree version has moved.
use dircomp_core::model::format::{format_bytes, format_count, format_elapsed};
use dircomp_core::model::{DiffStatus, NodeIndex};
use dircomp_core::projector::VisibleRow;
use dircomp_core::summary::DiffSummary;
use dircomp_core::ComparisonSession;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Key-level commands the frontend translates input into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    /// Enter: toggle a directory, or request a file diff for a file pair.
    Activate,
    /// Right: expand, or step onto the first child of an expanded row.
    ExpandOrDescend,
    /// Left: collapse, or step onto the parent row.
    CollapseOrAscend,
    ToggleIdentical,
    ExpandAll,
    CollapseAll,
    Refresh,
    SwapSides,
    /// Escape while scanning.
    Cancel,
    Quit,
}

/// All state behind one diff view.
pub struct DiffViewState {
    session: ComparisonSession,

    /// Rows of the last projection.
    pub rows: Vec<VisibleRow>,
    pub cursor: usize,
    /// First row of the viewport.
    pub scroll_offset: usize,
    /// Viewport height in rows.
    pub page_height: usize,

    /// Tree version the rows were projected from; `None` forces a rebuild.
    last_version: Option<u64>,
    summary: DiffSummary,
    /// Nodes already pushed at viewport priority in this epoch.
    prioritized: HashSet<NodeIndex>,
    prioritized_epoch: u64,

    file_diff_request: Option<(PathBuf, PathBuf)>,
    pub should_close: bool,
}

impl DiffViewState {
    pub fn new(session: ComparisonSession, page_height: usize) -> Self {
        let epoch = session.epoch();
        let mut state = Self {
            session,
            rows: Vec::new(),
            cursor: 0,
            scroll_offset: 0,
            page_height: page_height.max(1),
            last_version: None,
            summary: DiffSummary::default(),
            prioritized: HashSet::new(),
            prioritized_epoch: epoch,
            file_diff_request: None,
            should_close: false,
        };
        state.poll();
        state
    }

    pub fn session(&self) -> &ComparisonSession {
        &self.session
    }

    pub fn summary(&self) -> &DiffSummary {
        &self.summary
    }

    /// Node under the cursor.
    pub fn cursor_node(&self) -> Option<NodeIndex> {
        self.rows.get(self.cursor).map(|r| r.node)
    }

    /// Rows inside the viewport.
    pub fn visible_window(&self) -> &[VisibleRow] {
        let start = self.scroll_offset.min(self.rows.len());
        let end = start.saturating_add(self.page_height).min(self.rows.len());
        &self.rows[start..end]
    }

    pub fn set_page_height(&mut self, page_height: usize) {
        self.page_height = page_height.max(1);
        self.scroll_to_cursor();
    }

    /// A `(left, right)` file pair the user asked to diff, if any.
    pub fn take_file_diff_request(&mut self) -> Option<(PathBuf, PathBuf)> {
        self.file_diff_request.take()
    }

    // ── Per-frame polling ──────────────────────────────────

    /// Re-project if the tree changed since the last call. Returns whether
    /// the rows were rebuilt.
    pub fn poll(&mut self) -> bool {
        let version = self.session.current_version();
        if self.last_version == Some(version) {
            return false;
        }
        self.last_version = Some(version);

        let anchor = self.cursor_node();
        self.rows = self.session.visible_rows();
        self.summary = self.session.summary();
        self.restore_cursor(anchor);
        self.serve_viewport();
        true
    }

    /// Keep the cursor on the same node across re-projections; fall back to
    /// the nearest row when it disappeared.
    fn restore_cursor(&mut self, anchor: Option<NodeIndex>) {
        let found = anchor.and_then(|node| self.rows.iter().position(|r| r.node == node));
        self.cursor = match found {
            Some(pos) => pos,
            None => self.cursor.min(self.rows.len().saturating_sub(1)),
        };
        self.scroll_to_cursor();
    }

    /// Answer expanded rows whose listing is missing and move unsettled
    /// viewport rows to the front of the scan queue.
    fn serve_viewport(&mut self) {
        let epoch = self.session.epoch();
        if epoch != self.prioritized_epoch {
            self.prioritized.clear();
            self.prioritized_epoch = epoch;
        }

        let start = self.scroll_offset.min(self.rows.len());
        let end = start.saturating_add(self.page_height).min(self.rows.len());
        let mut boost = Vec::new();
        let mut relist = Vec::new();
        for row in &self.rows[start..end] {
            if !row.has_children_pending && row.status != DiffStatus::Pending {
                continue;
            }
            if row.is_expanded {
                relist.push(row.node);
            }
            if self.prioritized.insert(row.node) {
                boost.push(row.node);
            }
        }
        for node in relist {
            self.session.expand_on_demand(node);
        }
        if !boost.is_empty() {
            debug!("Prioritising {} viewport rows", boost.len());
            self.session.prioritize(&boost);
        }
    }

    // ── Commands ───────────────────────────────────────────

    pub fn handle(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::Up => self.move_cursor(-1),
            ViewCommand::Down => self.move_cursor(1),
            ViewCommand::PageUp => self.move_cursor(-self.page_step()),
            ViewCommand::PageDown => self.move_cursor(self.page_step()),
            ViewCommand::Home => self.set_cursor(0),
            ViewCommand::End => self.set_cursor(self.rows.len().saturating_sub(1)),
            ViewCommand::Activate => self.activate(),
            ViewCommand::ExpandOrDescend => self.expand_or_descend(),
            ViewCommand::CollapseOrAscend => self.collapse_or_ascend(),
            ViewCommand::ToggleIdentical => {
                let hidden = self.session.toggle_hide_identical();
                debug!("Identical entries hidden: {hidden}");
                self.invalidate();
            }
            ViewCommand::ExpandAll => {
                self.session.expand_all();
                self.invalidate();
            }
            ViewCommand::CollapseAll => {
                self.session.collapse_all();
                self.invalidate();
            }
            ViewCommand::Refresh => {
                self.session.refresh();
                self.invalidate();
            }
            ViewCommand::SwapSides => self.swap_sides(),
            ViewCommand::Cancel => {
                if !self.session.is_complete() {
                    self.session.cancel();
                }
            }
            ViewCommand::Quit => self.should_close = true,
        }
    }

    fn invalidate(&mut self) {
        self.last_version = None;
        self.poll();
    }

    fn page_step(&self) -> isize {
        isize::try_from(self.page_height).unwrap_or(isize::MAX)
    }

    fn move_cursor(&mut self, delta: isize) {
        let target = self.cursor.saturating_add_signed(delta);
        self.set_cursor(target);
    }

    fn set_cursor(&mut self, row: usize) {
        self.cursor = row.min(self.rows.len().saturating_sub(1));
        self.scroll_to_cursor();
        self.serve_viewport();
    }

    fn scroll_to_cursor(&mut self) {
        if self.cursor < self.scroll_offset {
            self.scroll_offset = self.cursor;
        } else if self.cursor >= self.scroll_offset.saturating_add(self.page_height) {
            self.scroll_offset = self.cursor + 1 - self.page_height;
        }
        let max_offset = self.rows.len().saturating_sub(self.page_height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
    }

    fn activate(&mut self) {
        let Some(row) = self.rows.get(self.cursor).cloned() else {
            return;
        };
        if row.is_container {
            if row.is_expanded {
                self.session.collapse_index(row.node);
            } else {
                self.session.expand_index(row.node);
            }
            self.invalidate();
        } else if let Some(pair) = self.session.file_pair(row.node) {
            info!("File diff requested for {}", pair.0.display());
            self.file_diff_request = Some(pair);
        }
    }

    fn expand_or_descend(&mut self) {
        let Some(row) = self.rows.get(self.cursor).cloned() else {
            return;
        };
        if !row.is_container {
            return;
        }
        if !row.is_expanded {
            self.session.expand_index(row.node);
            self.invalidate();
        } else if self
            .rows
            .get(self.cursor + 1)
            .is_some_and(|next| next.depth == row.depth + 1)
        {
            self.set_cursor(self.cursor + 1);
        }
    }

    fn collapse_or_ascend(&mut self) {
        let Some(row) = self.rows.get(self.cursor).cloned() else {
            return;
        };
        if row.is_expanded {
            self.session.collapse_index(row.node);
            self.invalidate();
            return;
        }
        if row.depth == 0 {
            return;
        }
        if let Some(parent) = self.rows[..self.cursor]
            .iter()
            .rposition(|r| r.depth + 1 == row.depth)
        {
            self.set_cursor(parent);
        }
    }

    fn swap_sides(&mut self) {
        info!("Swapping sides");
        let swapped = self.session.swapped();
        if self.session.hide_identical() != swapped.hide_identical() {
            swapped.toggle_hide_identical();
        }
        self.session = swapped;
        self.rows.clear();
        self.cursor = 0;
        self.scroll_offset = 0;
        self.prioritized.clear();
        self.prioritized_epoch = self.session.epoch();
        self.invalidate();
    }

    // ── Status line ────────────────────────────────────────

    /// One-line summary: scan progress, difference counts, cursor position
    /// and filter state.
    pub fn status_line(&self) -> String {
        let stats = self.session.stats();
        let mut line = String::new();
        if stats.cancelled {
            line.push_str("Cancelled | ");
        } else if !stats.complete {
            line.push_str(&format!(
                "Scanning: {} dirs, {} files, {} read, {} | ",
                format_count(stats.dirs_listed),
                format_count(stats.files_compared),
                format_bytes(stats.bytes_compared),
                format_elapsed(stats.elapsed),
            ));
        }
        line.push_str(&self.summary.status_text());

        let position = if self.rows.is_empty() { 0 } else { self.cursor + 1 };
        line.push_str(&format!("  Item {position}/{}", self.rows.len()));
        if self.session.hide_identical() {
            line.push_str(" [Identical Hidden]");
        }
        line
    }
}
