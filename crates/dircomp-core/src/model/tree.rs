/// Thread-safe, incrementally growing comparison tree.
///
/// All nodes live in an append-only arena of individually locked slots.
/// Workers mutate one node at a time under that node's mutex; readers clone
/// the slot handle under a short arena read lock and then lock just the node
/// they need, so building the visible list never waits on a whole-tree lock.
///
/// # Lock ordering
///
/// A thread holds at most one node lock at a time, except during a listing
/// commit, which locks a parent and then each of its children in turn.
/// Nothing ever locks a child and then its parent, so the parent→child
/// nesting cannot deadlock. The arena lock is never held while waiting for
/// a node lock.
use super::node::{DiffNode, NodeIndex};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Slot = Arc<Mutex<DiffNode>>;

/// The shared tree of comparison results.
#[derive(Debug)]
pub struct TreeStore {
    slots: RwLock<Vec<Slot>>,
    paths: RwLock<HashMap<String, NodeIndex>>,
    version: AtomicU64,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    /// Create a store holding only the comparison root.
    pub fn new() -> Self {
        let root = DiffNode::new_root();
        let mut paths = HashMap::new();
        paths.insert(String::new(), NodeIndex::ROOT);
        Self {
            slots: RwLock::new(vec![Arc::new(Mutex::new(root))]),
            paths: RwLock::new(paths),
            version: AtomicU64::new(0),
        }
    }

    /// Global version, bumped on every committed mutation.
    #[inline]
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Total number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    fn slot(&self, index: NodeIndex) -> Option<Slot> {
        self.slots.read().get(index.idx()).cloned()
    }

    /// Resolve a relative path to its arena index.
    pub fn lookup(&self, relative_path: &str) -> Option<NodeIndex> {
        self.paths.read().get(relative_path).copied()
    }

    /// Point-in-time copy of a node.
    pub fn snapshot(&self, index: NodeIndex) -> Option<DiffNode> {
        self.read(index, DiffNode::clone)
    }

    /// Point-in-time copy of the node at `relative_path`.
    pub fn get(&self, relative_path: &str) -> Option<DiffNode> {
        self.snapshot(self.lookup(relative_path)?)
    }

    /// Inspect a node under its lock without cloning it.
    pub fn read<R>(&self, index: NodeIndex, f: impl FnOnce(&DiffNode) -> R) -> Option<R> {
        let slot = self.slot(index)?;
        let guard = slot.lock();
        Some(f(&guard))
    }

    /// Mutate a node and stamp it, and all of its ancestors, with a new
    /// global version.
    pub fn mutate<R>(&self, index: NodeIndex, f: impl FnOnce(&mut DiffNode) -> R) -> Option<R> {
        let (result, parent, version) = {
            let slot = self.slot(index)?;
            let mut node = slot.lock();
            let result = f(&mut node);
            let version = self.bump();
            node.version = version;
            (result, node.parent, version)
        };
        self.stamp_ancestors(parent, version);
        Some(result)
    }

    /// Mutate the node at `relative_path`.
    pub fn mutate_path<R>(&self, relative_path: &str, f: impl FnOnce(&mut DiffNode) -> R) -> Option<R> {
        self.mutate(self.lookup(relative_path)?, f)
    }

    /// Mutate a node without touching its ancestors.
    ///
    /// Only for use while the caller already holds the parent's lock (a
    /// listing commit); the enclosing [`mutate`](Self::mutate) stamps the
    /// ancestors once the parent lock is released.
    pub(crate) fn mutate_nested<R>(&self, index: NodeIndex, f: impl FnOnce(&mut DiffNode) -> R) -> Option<R> {
        let slot = self.slot(index)?;
        let mut node = slot.lock();
        let result = f(&mut node);
        node.version = self.bump();
        Some(result)
    }

    /// Append a node to the arena and register its path.
    ///
    /// The caller links it into the parent's `children` map; until then it
    /// is unreachable from the root.
    pub(crate) fn insert(&self, mut node: DiffNode) -> NodeIndex {
        node.version = self.bump();
        let path = node.relative_path.clone();
        let index = {
            let mut slots = self.slots.write();
            let index = NodeIndex::new(slots.len());
            slots.push(Arc::new(Mutex::new(node)));
            index
        };
        self.paths.write().insert(path, index);
        index
    }

    /// Apply `f` to every node, one lock at a time, in arena order.
    ///
    /// Each node stays locked while `f` sees it, so `f` must not call back
    /// into the store; collect what it needs and read the tree afterwards.
    pub fn for_each(&self, mut f: impl FnMut(NodeIndex, &DiffNode)) {
        let slots: Vec<Slot> = self.slots.read().clone();
        for (i, slot) in slots.iter().enumerate() {
            f(NodeIndex::new(i), &slot.lock());
        }
    }

    /// Mutate every node, one lock at a time. Used for forced rescans.
    pub(crate) fn mutate_all(&self, mut f: impl FnMut(&mut DiffNode)) {
        let slots: Vec<Slot> = self.slots.read().clone();
        for slot in &slots {
            let mut node = slot.lock();
            f(&mut node);
            node.version = self.bump();
        }
    }

    /// Direct children of a node in display order.
    pub fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.read(index, |node| node.children.values().copied().collect())
            .unwrap_or_default()
    }

    /// Walk from `index` up to the root, inclusive of `index`.
    pub fn ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut chain = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            chain.push(idx);
            current = self.read(idx, |n| n.parent).flatten();
        }
        chain
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn stamp_ancestors(&self, mut parent: Option<NodeIndex>, version: u64) {
        while let Some(idx) = parent {
            parent = self
                .stamp_one(idx, version)
                .flatten();
        }
    }

    fn stamp_one(&self, index: NodeIndex, version: u64) -> Option<Option<NodeIndex>> {
        let slot = self.slot(index)?;
        let mut node = slot.lock();
        if node.version < version {
            node.version = version;
        }
        Some(node.parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::DiffStatus;
    use compact_str::CompactString;
    use std::ffi::OsString;

    fn add_child(store: &TreeStore, parent: NodeIndex, name: &str) -> NodeIndex {
        let (path, depth) = store
            .read(parent, |p| {
                let path = if p.relative_path.is_empty() {
                    name.to_owned()
                } else {
                    format!("{}/{name}", p.relative_path)
                };
                (path, p.depth + 1)
            })
            .unwrap();
        let child = store.insert(DiffNode::new_child(
            CompactString::new(name),
            path,
            Some(parent),
            depth,
        ));
        store.mutate(parent, |p| {
            p.children.insert(OsString::from(name), child);
        });
        child
    }

    #[test]
    fn paths_resolve_to_nodes() {
        let store = TreeStore::new();
        let dir = add_child(&store, NodeIndex::ROOT, "dir");
        let file = add_child(&store, dir, "a.txt");

        assert_eq!(store.lookup(""), Some(NodeIndex::ROOT));
        assert_eq!(store.lookup("dir/a.txt"), Some(file));
        assert_eq!(store.get("dir/a.txt").unwrap().name, "a.txt");
        assert!(store.get("missing").is_none());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn mutate_by_path_edits_the_named_node() {
        let store = TreeStore::new();
        let dir = add_child(&store, NodeIndex::ROOT, "dir");
        add_child(&store, dir, "a.txt");
        let before = store.current_version();

        let old = store.mutate_path("dir/a.txt", |n| {
            std::mem::replace(&mut n.status, DiffStatus::ContentDifferent)
        });

        assert_eq!(old, Some(DiffStatus::Pending));
        assert_eq!(store.get("dir/a.txt").unwrap().status, DiffStatus::ContentDifferent);
        assert_eq!(store.get("dir").unwrap().status, DiffStatus::Pending);
        assert!(store.get("dir").unwrap().version > before);
        assert!(store.mutate_path("dir/missing", |n| n.status = DiffStatus::Error).is_none());
    }

    #[test]
    fn mutation_stamps_node_and_ancestors() {
        let store = TreeStore::new();
        let dir = add_child(&store, NodeIndex::ROOT, "dir");
        let file = add_child(&store, dir, "a.txt");
        let before = store.current_version();

        store.mutate(file, |n| n.status = DiffStatus::Identical);

        let after = store.current_version();
        assert!(after > before);
        assert_eq!(store.snapshot(file).unwrap().version, after);
        assert_eq!(store.snapshot(dir).unwrap().version, after);
        assert_eq!(store.snapshot(NodeIndex::ROOT).unwrap().version, after);
    }

    #[test]
    fn children_come_back_in_lexicographic_order() {
        let store = TreeStore::new();
        for name in ["b", "B", "a", "_"] {
            add_child(&store, NodeIndex::ROOT, name);
        }
        let names: Vec<String> = store
            .children(NodeIndex::ROOT)
            .into_iter()
            .map(|c| store.snapshot(c).unwrap().name.to_string())
            .collect();
        assert_eq!(names, vec!["B", "_", "a", "b"]);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let store = TreeStore::new();
        let a = add_child(&store, NodeIndex::ROOT, "a");
        let b = add_child(&store, a, "b");
        assert_eq!(store.ancestors(b), vec![b, a, NodeIndex::ROOT]);
    }
}
