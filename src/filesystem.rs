//! Read access to layer inputs.
//!
//! The composition engine only needs to read bytes at a path and to ask
//! whether a path is a directory. `DiskFS` serves real builds; `MemoryFS`
//! holds a whole layer tree in memory for tests and embedding.

use crate::error::{Error, Result};
use crate::path::normalize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read-only filesystem capability used while resolving layers.
pub trait FileSystem: Send + Sync {
    /// Read the full contents of a file.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Returns true if `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Returns true if `path` is a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| Error::Filesystem {
            message: format!("File content is not valid UTF-8: {}", path.display()),
        })
    }

    /// Returns true if `path` exists as a file or directory.
    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    /// Every file beneath `dir`, recursively, as paths relative to `dir`,
    /// in sorted order.
    fn files_under(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFS;

impl FileSystem for DiskFS {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| Error::Filesystem {
            message: format!("Failed to read {}: {}", path.display(), e),
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn files_under(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Filesystem {
                message: format!("Failed to walk {}: {}", dir.display(), e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(dir) {
                files.push(relative.to_path_buf());
            }
        }
        Ok(files)
    }
}

/// In-memory filesystem for tests and embedding
///
/// Directories are implicit: a path is a directory when some file lives
/// beneath it.
#[derive(Debug, Clone, Default)]
pub struct MemoryFS {
    /// Files stored as normalized path -> content mapping
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFS {
    /// Create a new empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a file with content
    pub fn add_file_content<P: AsRef<Path>>(&mut self, path: P, content: Vec<u8>) -> Result<()> {
        let path = normalize(path.as_ref());
        if self.is_file_prefix(&path) {
            return Err(Error::Filesystem {
                message: format!("Cannot create {} beneath a file", path.display()),
            });
        }
        self.files.insert(path, content);
        Ok(())
    }

    /// Add or update a file with string content
    pub fn add_file_string<P: AsRef<Path>>(&mut self, path: P, content: &str) -> Result<()> {
        self.add_file_content(path, content.as_bytes().to_vec())
    }

    /// Builder-style variant of `add_file_string` for test fixtures.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P, content: &str) -> Result<Self> {
        self.add_file_string(path, content)?;
        Ok(self)
    }

    /// Get the number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if filesystem is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn is_file_prefix(&self, path: &Path) -> bool {
        path.ancestors()
            .skip(1)
            .any(|ancestor| self.files.contains_key(ancestor))
    }
}

impl FileSystem for MemoryFS {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::Filesystem {
                message: format!("File not found: {}", path.display()),
            })
    }

    fn is_dir(&self, path: &Path) -> bool {
        let path = normalize(path);
        if path == Path::new(".") {
            return !self.files.is_empty();
        }
        self.files
            .keys()
            .any(|file| file != &path && file.starts_with(&path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn files_under(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let dir = normalize(dir);
        let root = dir == Path::new(".");
        Ok(self
            .files
            .keys()
            .filter_map(|file| {
                if root {
                    Some(file.clone())
                } else {
                    file.strip_prefix(&dir)
                        .ok()
                        .filter(|rel| !rel.as_os_str().is_empty())
                        .map(Path::to_path_buf)
                }
            })
            .collect())
    }
}
