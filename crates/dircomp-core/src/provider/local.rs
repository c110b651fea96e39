/// Provider for the host filesystem.
use super::{ContentReader, EntryKind, EntryMeta, FileSystemProvider};
use crate::error::ProviderError;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads directly from local disk via `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Classify a path, following symlinks. Broken links are reported as empty
/// files so they still show up in the diff instead of vanishing.
fn classify(path: &Path, is_symlink: bool) -> Result<(EntryKind, u64, Option<std::time::SystemTime>), ProviderError> {
    match fs::metadata(path) {
        Ok(meta) => {
            let kind = if meta.is_dir() {
                if is_symlink {
                    EntryKind::SymlinkDir
                } else {
                    EntryKind::Directory
                }
            } else {
                EntryKind::File
            };
            let size = if meta.is_dir() { 0 } else { meta.len() };
            Ok((kind, size, meta.modified().ok()))
        }
        Err(err) if is_symlink => {
            debug!("Dangling symlink {}: {err}", path.display());
            let modified = fs::symlink_metadata(path)
                .ok()
                .and_then(|m| m.modified().ok());
            Ok((EntryKind::File, 0, modified))
        }
        Err(err) => Err(ProviderError::from_io(path, &err)),
    }
}

impl FileSystemProvider for LocalProvider {
    fn list(&self, path: &Path) -> Result<Vec<EntryMeta>, ProviderError> {
        let reader = fs::read_dir(path).map_err(|e| ProviderError::from_io(path, &e))?;
        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|e| ProviderError::from_io(path, &e))?;
            let child = entry.path();
            let is_symlink = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
            let (kind, size, modified) = match classify(&child, is_symlink) {
                Ok(info) => info,
                Err(err) => {
                    // Keep the entry visible; the content read will surface the error.
                    warn!("Cannot stat {}: {err}", child.display());
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    let kind = if is_dir { EntryKind::Directory } else { EntryKind::File };
                    (kind, 0, None)
                }
            };
            entries.push(EntryMeta::from_raw(entry.file_name(), kind, size, modified));
        }
        Ok(entries)
    }

    fn stat(&self, path: &Path) -> Result<EntryMeta, ProviderError> {
        let is_symlink = fs::symlink_metadata(path)
            .map_err(|e| ProviderError::from_io(path, &e))?
            .file_type()
            .is_symlink();
        let (kind, size, modified) = classify(path, is_symlink)?;
        let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        Ok(EntryMeta::from_raw(name, kind, size, modified))
    }

    fn read_chunk(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError> {
        LocalReader::open(path)?.read_at(offset, len)
    }

    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn ContentReader + 'a>, ProviderError> {
        Ok(Box::new(LocalReader::open(path)?))
    }

    fn real_path(&self, path: &Path) -> Result<PathBuf, ProviderError> {
        fs::canonicalize(path).map_err(|e| ProviderError::from_io(path, &e))
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// One open handle, read sequentially. Seeks only when a read does not
/// continue where the last one stopped.
struct LocalReader {
    file: fs::File,
    path: PathBuf,
    position: u64,
}

impl LocalReader {
    fn open(path: &Path) -> Result<Self, ProviderError> {
        let file = fs::File::open(path).map_err(|e| ProviderError::from_io(path, &e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            position: 0,
        })
    }
}

impl ContentReader for LocalReader {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError> {
        let path = &self.path;
        let io_err = |e: std::io::Error| ProviderError::from_io(path, &e);
        if offset != self.position {
            self.file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
            self.position = offset;
        }

        let mut buf = Vec::with_capacity(len);
        (&mut self.file)
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(io_err)?;
        self.position += buf.len() as u64;
        Ok(buf)
    }
}
