/// Comparison reports.
///
/// Walks the whole tree (not just the expanded rows) in display order and
/// writes one record per entry as CSV or pretty-printed JSON.
use crate::error::{ErrorKind, ExportError};
use crate::model::{DiffNode, DiffStatus, NodeIndex, Presence, SideMeta, TreeStore};
use crate::scanner::ComparisonSession;
use crate::summary::DiffSummary;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output encoding of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    /// Pick a format from a file extension (`.json`, anything else is CSV).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// One entry of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub path: String,
    pub status: DiffStatus,
    pub left: Presence,
    pub right: Presence,
    pub left_size: Option<u64>,
    pub right_size: Option<u64>,
    pub left_modified: Option<String>,
    pub right_modified: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl ReportEntry {
    fn from_node(node: &DiffNode) -> Self {
        let size = |presence: Presence, meta: &SideMeta| {
            (presence == Presence::File).then_some(meta.size)
        };
        let modified = |presence: Presence, meta: &SideMeta| {
            if !presence.is_present() {
                return None;
            }
            meta.modified
                .map(|t| DateTime::<Local>::from(t).to_rfc3339())
        };
        Self {
            path: node.relative_path.clone(),
            status: node.status,
            left: node.left,
            right: node.right,
            left_size: size(node.left, &node.left_meta),
            right_size: size(node.right, &node.right_meta),
            left_modified: modified(node.left, &node.left_meta),
            right_modified: modified(node.right, &node.right_meta),
            error_kind: node.error.as_ref().map(|e| e.kind),
            error_message: node.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

/// A full comparison report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Local>,
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub complete: bool,
    pub summary: DiffSummary,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// Capture the session's current state.
    pub fn from_session(session: &ComparisonSession) -> Self {
        Self {
            generated_at: Local::now(),
            left_root: session.left_root().to_path_buf(),
            right_root: session.right_root().to_path_buf(),
            complete: session.is_complete(),
            summary: session.summary(),
            entries: collect_entries(session.tree()),
        }
    }

    /// One CSV record per entry, with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_writer(writer);
        for entry in &self.entries {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn write<W: Write>(&self, format: ReportFormat, writer: W) -> Result<(), ExportError> {
        match format {
            ReportFormat::Csv => self.write_csv(writer),
            ReportFormat::Json => self.write_json(writer),
        }
    }

    /// Write to `path`, choosing the format from its extension.
    pub fn save(&self, path: &Path) -> Result<(), ExportError> {
        let file = std::fs::File::create(path)?;
        self.write(ReportFormat::from_path(path), std::io::BufWriter::new(file))
    }
}

/// Every live node below the root, depth-first in name order.
fn collect_entries(tree: &TreeStore) -> Vec<ReportEntry> {
    let mut entries = Vec::new();
    let mut stack: Vec<NodeIndex> = tree.children(NodeIndex::ROOT);
    stack.reverse();
    while let Some(index) = stack.pop() {
        let Some((entry, children)) = tree
            .read(index, |node| {
                (!node.is_vanished()).then(|| {
                    (
                        ReportEntry::from_node(node),
                        node.children.values().copied().collect::<Vec<_>>(),
                    )
                })
            })
            .flatten()
        else {
            continue;
        };
        entries.push(entry);
        stack.extend(children.into_iter().rev());
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompareConfig;
    use crate::provider::memory::MemoryProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn finished_session() -> ComparisonSession {
        let left = MemoryProvider::new("left");
        left.add_file("/l/same.txt", b"abc".to_vec())
            .add_file("/l/sub/changed.txt", b"one".to_vec())
            .add_file("/l/gone.txt", b"x".to_vec());
        let right = MemoryProvider::new("right");
        right
            .add_file("/r/same.txt", b"abc".to_vec())
            .add_file("/r/sub/changed.txt", b"two".to_vec());

        let config = CompareConfig {
            worker_count: 2,
            ..CompareConfig::default()
        };
        let session =
            ComparisonSession::start_with_providers("/l", Arc::new(left), "/r", Arc::new(right), config);
        assert!(session.wait_until_complete(Duration::from_secs(5)));
        session
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ReportFormat::from_path(Path::new("out.JSON")), ReportFormat::Json);
        assert_eq!(ReportFormat::from_path(Path::new("out.csv")), ReportFormat::Csv);
        assert_eq!(ReportFormat::from_path(Path::new("out")), ReportFormat::Csv);
    }

    #[test]
    fn entries_are_in_display_order() {
        let report = Report::from_session(&finished_session());
        let paths: Vec<&str> = report.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["gone.txt", "same.txt", "sub", "sub/changed.txt"]);
        assert_eq!(report.entries[0].status, DiffStatus::OnlyLeft);
        assert_eq!(report.entries[0].right_size, None);
        assert!(report.complete);
    }

    #[test]
    fn csv_has_header_and_one_row_per_entry() {
        let report = Report::from_session(&finished_session());
        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("path,status,left,right"));
        assert_eq!(lines.len(), 1 + report.entries.len());
        assert!(lines[1].starts_with("gone.txt,only_left,file,absent,1,"));
    }

    #[test]
    fn json_carries_summary_and_timestamp() {
        let report = Report::from_session(&finished_session());
        let mut out = Vec::new();
        report.write_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["summary"]["only_left"], 1);
        assert_eq!(value["summary"]["content_different"], 1);
        assert!(value["generated_at"].is_string());
        assert_eq!(value["entries"][3]["status"], "content_different");
    }
}
