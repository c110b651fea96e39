/// dircomp view: renderer-agnostic state for the dual-pane diff viewer.
///
/// This crate turns key-level commands into session calls and keeps the
/// cursor, scroll window and status line. Drawing lives in the frontend;
/// comparison logic lives in `dircomp-core`.
pub mod state;
pub mod style;

pub use state::{DiffViewState, ViewCommand};
pub use style::{style_for, RowStyle, Tone};
