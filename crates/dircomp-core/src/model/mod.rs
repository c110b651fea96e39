/// Data model for the comparison tree.
///
/// Re-exports the arena-backed store and the node types.
pub mod format;
pub mod node;
pub mod tree;

pub use node::{
    ChildTally, DiffNode, DiffStatus, ErrorInfo, NodeIndex, Presence, ScanState, SideMeta,
};
pub use tree::TreeStore;
