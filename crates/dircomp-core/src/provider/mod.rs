/// Storage-agnostic filesystem access.
///
/// The comparison engine never touches `std::fs` directly. Every listing,
/// stat and content read goes through a [`FileSystemProvider`], so the same
/// scheduler works for local disk, archive-backed and remote trees.
///
/// - [`LocalProvider`]: the host filesystem.
/// - [`MemoryProvider`]: an in-memory tree with injectable latency and
///   failures, used by tests and demos.
pub mod local;
pub mod memory;

pub use local::LocalProvider;
pub use memory::MemoryProvider;

use crate::error::ProviderError;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Kind of a listed entry, after following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    /// A symlink whose target is a directory. Descended into like a
    /// directory, with cycle protection.
    SymlinkDir,
}

impl EntryKind {
    #[inline]
    pub fn is_dir_like(self) -> bool {
        matches!(self, EntryKind::Directory | EntryKind::SymlinkDir)
    }
}

/// One entry returned by [`FileSystemProvider::list`] or `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Basename as the backend spells it. Entries are matched and joined
    /// back into paths by this, never by the display name.
    pub raw_name: OsString,
    /// Basename for display (lossy for names that are not UTF-8).
    pub name: CompactString,
    pub kind: EntryKind,
    /// Logical size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl EntryMeta {
    /// Build an entry from the backend's own name.
    pub fn from_raw(raw_name: OsString, kind: EntryKind, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            name: CompactString::new(raw_name.to_string_lossy()),
            raw_name,
            kind,
            size,
            modified,
        }
    }

    pub fn file(name: &str, size: u64) -> Self {
        Self {
            raw_name: OsString::from(name),
            name: CompactString::new(name),
            kind: EntryKind::File,
            size,
            modified: None,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            raw_name: OsString::from(name),
            name: CompactString::new(name),
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
        }
    }
}

/// Uniform directory-listing, stat and read operations.
///
/// Implementations must be callable from many worker threads at once and
/// must report failures through [`ProviderError`] with the matching
/// [`ErrorKind`](crate::error::ErrorKind). A vanished path is `NotFound`; a
/// backend that is gone entirely is `ProviderUnavailable`.
pub trait FileSystemProvider: Send + Sync {
    /// List the direct children of a directory. Order is unspecified.
    fn list(&self, path: &Path) -> Result<Vec<EntryMeta>, ProviderError>;

    /// Stat a single path, following symlinks.
    fn stat(&self, path: &Path) -> Result<EntryMeta, ProviderError>;

    /// Read up to `len` bytes starting at `offset`. A short (or empty)
    /// result means end of file.
    fn read_chunk(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError>;

    /// Open a file for a run of chunk reads.
    ///
    /// The default forwards every read to [`read_chunk`](Self::read_chunk).
    /// Backends with a real file handle keep it open for the whole run.
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn ContentReader + 'a>, ProviderError> {
        Ok(Box::new(ChunkedReader {
            provider: self,
            path: path.to_path_buf(),
        }))
    }

    /// Canonical identity of a directory, used to detect symlink cycles.
    ///
    /// Backends without links can keep the default, which treats every
    /// path as its own identity.
    fn real_path(&self, path: &Path) -> Result<PathBuf, ProviderError> {
        Ok(path.to_path_buf())
    }

    /// Short human-readable backend name for logs.
    fn name(&self) -> &str;
}

/// An open file that is read front to back in chunks.
pub trait ContentReader {
    /// Read up to `len` bytes starting at `offset`. A short (or empty)
    /// result means end of file.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError>;
}

struct ChunkedReader<'a, P: ?Sized> {
    provider: &'a P,
    path: PathBuf,
}

impl<P: FileSystemProvider + ?Sized> ContentReader for ChunkedReader<'_, P> {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError> {
        self.provider.read_chunk(&self.path, offset, len)
    }
}
