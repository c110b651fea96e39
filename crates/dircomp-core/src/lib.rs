/// dircomp core: progressive recursive directory comparison.
///
/// This crate contains the comparison engine with zero UI dependencies. A
/// frontend (terminal, GUI or CLI) starts a [`scanner::ComparisonSession`],
/// polls its version counter, and draws the rows the projector hands back.
///
/// # Modules
///
/// - [`model`]: Arena-allocated comparison tree and supporting types.
/// - [`provider`]: Filesystem backends: local disk and an in-memory tree.
/// - [`engine`]: Pure listing/file comparison and status propagation.
/// - [`scanner`]: Comparison session, priority queue and worker pool.
/// - [`projector`]: Flattens the tree into visible rows.
/// - [`summary`]: Per-status counts for the status line.
/// - [`export`]: CSV and JSON reports.
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod projector;
pub mod provider;
pub mod scanner;
pub mod summary;

pub use config::CompareConfig;
pub use scanner::ComparisonSession;
