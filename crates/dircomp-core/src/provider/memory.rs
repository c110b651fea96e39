/// In-memory provider with latency and fault injection.
///
/// Paths are absolute (`/left/a.txt`). Symlinks store an absolute target and
/// are followed by every operation, so cyclic link graphs can be modelled
/// without touching the host filesystem.
use super::{EntryKind, EntryMeta, FileSystemProvider};
use crate::error::{ErrorKind, ProviderError};
use compact_str::CompactString;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Maximum link hops while resolving one path.
const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum MemNode {
    Dir,
    File(Vec<u8>),
    Link(PathBuf),
}

#[derive(Debug, Default)]
struct MemState {
    nodes: BTreeMap<PathBuf, MemNode>,
    children: BTreeMap<PathBuf, BTreeSet<CompactString>>,
    failures: HashMap<PathBuf, ErrorKind>,
    latency: Duration,
    unavailable: bool,
}

impl MemState {
    fn insert(&mut self, path: &Path, node: MemNode) {
        if let Some(parent) = path.parent() {
            if !self.nodes.contains_key(parent) {
                self.insert(parent, MemNode::Dir);
            }
            if let Some(name) = path.file_name() {
                self.children
                    .entry(parent.to_path_buf())
                    .or_default()
                    .insert(CompactString::new(name.to_string_lossy()));
            }
        }
        self.nodes.insert(path.to_path_buf(), node);
    }

    fn remove(&mut self, path: &Path) {
        if let Some(names) = self.children.remove(path) {
            for name in names {
                self.remove(&path.join(name.as_str()));
            }
        }
        self.nodes.remove(path);
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.remove(name.to_string_lossy().as_ref());
            }
        }
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, ProviderError> {
        let mut resolved = PathBuf::new();
        let mut hops = 0;
        for component in path.components() {
            match component {
                Component::CurDir => continue,
                Component::ParentDir => {
                    resolved.pop();
                    continue;
                }
                other => resolved.push(other.as_os_str()),
            }
            while let Some(MemNode::Link(target)) = self.nodes.get(&resolved) {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(ProviderError::new(
                        ErrorKind::Io,
                        path,
                        "too many levels of symbolic links",
                    ));
                }
                resolved = target.clone();
            }
        }
        Ok(resolved)
    }

    fn meta_of(&self, path: &Path, name: &str) -> Option<EntryMeta> {
        let is_link = matches!(self.nodes.get(path), Some(MemNode::Link(_)));
        let resolved = self.resolve(path).ok()?;
        let meta = match self.nodes.get(&resolved) {
            Some(MemNode::Dir) if is_link => EntryMeta {
                kind: EntryKind::SymlinkDir,
                ..EntryMeta::dir(name)
            },
            Some(MemNode::Dir) => EntryMeta::dir(name),
            Some(MemNode::File(bytes)) => EntryMeta::file(name, bytes.len() as u64),
            // Dangling link.
            Some(MemNode::Link(_)) | None if is_link => EntryMeta::file(name, 0),
            _ => return None,
        };
        Some(meta)
    }

    fn check(&self, path: &Path) -> Result<(), ProviderError> {
        if self.unavailable {
            return Err(ProviderError::new(
                ErrorKind::ProviderUnavailable,
                path,
                "backend is offline",
            ));
        }
        if let Some(&kind) = self.failures.get(path) {
            return Err(ProviderError::new(kind, path, "injected failure"));
        }
        Ok(())
    }
}

/// A thread-safe in-memory filesystem.
#[derive(Debug)]
pub struct MemoryProvider {
    name: String,
    state: RwLock<MemState>,
    list_calls: AtomicU64,
    read_calls: AtomicU64,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryProvider {
    pub fn new(name: &str) -> Self {
        let mut state = MemState::default();
        state.nodes.insert(PathBuf::from("/"), MemNode::Dir);
        Self {
            name: name.to_owned(),
            state: RwLock::new(state),
            list_calls: AtomicU64::new(0),
            read_calls: AtomicU64::new(0),
        }
    }

    /// Create a directory and any missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        self.state.write().insert(path.as_ref(), MemNode::Dir);
        self
    }

    /// Create (or overwrite) a file and any missing ancestors.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> &Self {
        self.state
            .write()
            .insert(path.as_ref(), MemNode::File(contents.into()));
        self
    }

    /// Create a symlink at `path` pointing to the absolute `target`.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) -> &Self {
        self.state
            .write()
            .insert(path.as_ref(), MemNode::Link(target.into()));
        self
    }

    /// Delete a path and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) -> &Self {
        self.state.write().remove(path.as_ref());
        self
    }

    /// Make every operation on exactly `path` fail with `kind`.
    pub fn fail(&self, path: impl AsRef<Path>, kind: ErrorKind) -> &Self {
        self.state
            .write()
            .failures
            .insert(path.as_ref().to_path_buf(), kind);
        self
    }

    pub fn clear_failures(&self) {
        self.state.write().failures.clear();
    }

    /// Delay applied to every `list` and `read_chunk` call.
    pub fn set_latency(&self, latency: Duration) {
        self.state.write().latency = latency;
    }

    /// Simulate total loss of the backend.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    /// Number of `list` calls served so far.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of `read_chunk` calls served so far.
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::Relaxed)
    }

    fn pause(&self) {
        let latency = self.state.read().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
    }
}

impl FileSystemProvider for MemoryProvider {
    fn list(&self, path: &Path) -> Result<Vec<EntryMeta>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.pause();

        let state = self.state.read();
        state.check(path)?;
        let resolved = state.resolve(path)?;
        match state.nodes.get(&resolved) {
            Some(MemNode::Dir) => {}
            Some(_) => {
                return Err(ProviderError::new(ErrorKind::Io, path, "not a directory"));
            }
            None => {
                return Err(ProviderError::new(ErrorKind::NotFound, path, "no such directory"));
            }
        }

        let entries: Vec<EntryMeta> = state
            .children
            .get(&resolved)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| state.meta_of(&resolved.join(name.as_str()), name))
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    fn stat(&self, path: &Path) -> Result<EntryMeta, ProviderError> {
        let state = self.state.read();
        state.check(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        state
            .meta_of(path, &name)
            .ok_or_else(|| ProviderError::new(ErrorKind::NotFound, path, "no such entry"))
    }

    fn read_chunk(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError> {
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        self.pause();

        let state = self.state.read();
        state.check(path)?;
        let resolved = state.resolve(path)?;
        match state.nodes.get(&resolved) {
            Some(MemNode::File(bytes)) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
                let end = start.saturating_add(len).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
            Some(_) => Err(ProviderError::new(ErrorKind::Io, path, "is a directory")),
            None => Err(ProviderError::new(ErrorKind::NotFound, path, "no such file")),
        }
    }

    fn real_path(&self, path: &Path) -> Result<PathBuf, ProviderError> {
        let state = self.state.read();
        state.check(path)?;
        state.resolve(path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ancestors_and_lists_children() {
        let fs = MemoryProvider::default();
        fs.add_file("/root/a/b.txt", "bee").add_dir("/root/c");

        let mut names: Vec<_> = fs
            .list(Path::new("/root"))
            .unwrap()
            .into_iter()
            .map(|e| (e.name.to_string(), e.kind))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("a".to_owned(), EntryKind::Directory),
                ("c".to_owned(), EntryKind::Directory)
            ]
        );
        assert_eq!(fs.stat(Path::new("/root/a/b.txt")).unwrap().size, 3);
    }

    #[test]
    fn symlinks_are_followed_and_resolved() {
        let fs = MemoryProvider::default();
        fs.add_file("/data/x.txt", "x")
            .add_symlink("/root/link", "/data");

        let entries = fs.list(Path::new("/root")).unwrap();
        assert_eq!(entries[0].kind, EntryKind::SymlinkDir);
        assert_eq!(fs.list(Path::new("/root/link")).unwrap()[0].name, "x.txt");
        assert_eq!(
            fs.real_path(Path::new("/root/link")).unwrap(),
            PathBuf::from("/data")
        );
    }

    #[test]
    fn injected_failures_and_outages() {
        let fs = MemoryProvider::default();
        fs.add_dir("/root/locked");
        fs.fail("/root/locked", ErrorKind::PermissionDenied);
        assert_eq!(
            fs.list(Path::new("/root/locked")).unwrap_err().kind,
            ErrorKind::PermissionDenied
        );

        fs.set_unavailable(true);
        assert_eq!(
            fs.list(Path::new("/root")).unwrap_err().kind,
            ErrorKind::ProviderUnavailable
        );
    }

    #[test]
    fn remove_deletes_subtree() {
        let fs = MemoryProvider::default();
        fs.add_file("/root/gone/f.txt", "f").add_file("/root/kept.txt", "k");
        fs.remove("/root/gone");

        let entries = fs.list(Path::new("/root")).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(fs.list(Path::new("/root/gone")).unwrap_err().is_not_found());
    }

    #[test]
    fn read_chunk_slices_contents() {
        let fs = MemoryProvider::default();
        fs.add_file("/f.bin", b"abcdef".to_vec());
        assert_eq!(fs.read_chunk(Path::new("/f.bin"), 4, 10).unwrap(), b"ef");
        assert!(fs.read_chunk(Path::new("/f.bin"), 6, 10).unwrap().is_empty());
        assert_eq!(fs.read_calls(), 2);
    }
}
