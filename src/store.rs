//! File store collaborator: guarded reads and atomic writes.
//!
//! The engine never touches the disk directly; it goes through a
//! [`FileStore`] so the escalation tiers can run against memory in tests
//! and dry runs. The disk implementation resolves every path through the
//! workspace guard, snapshots content hashes at read time, and refuses to
//! clobber a file that changed underneath an in-flight escalation.

use crate::safety::{SafetyError, WorkspaceGuard};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Safety(SafetyError),

    #[error("file changed on disk since it was read: {0}")]
    ConcurrentModification(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Read/write access to the files a patch names.
pub trait FileStore {
    fn read(&mut self, path: &str) -> Result<String, StoreError>;
    fn write(&mut self, path: &str, content: &str) -> Result<(), StoreError>;
}

/// Disk-backed store scoped to one workspace.
pub struct DiskStore {
    guard: WorkspaceGuard,
    /// xxh3 of content as of the last read, keyed by resolved path.
    snapshots: HashMap<PathBuf, u64>,
    dry_run: bool,
}

impl DiskStore {
    pub fn new(guard: WorkspaceGuard) -> Self {
        Self {
            guard,
            snapshots: HashMap::new(),
            dry_run: false,
        }
    }

    /// Run the full pipeline without writing anything back.
    pub fn dry_run(guard: WorkspaceGuard) -> Self {
        Self {
            guard,
            snapshots: HashMap::new(),
            dry_run: true,
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        self.guard.resolve_patch_path(path).map_err(|e| match e {
            SafetyError::Canonicalize(io) if io.kind() == std::io::ErrorKind::NotFound => {
                StoreError::NotFound(path.to_string())
            }
            other => StoreError::Safety(other),
        })
    }
}

impl FileStore for DiskStore {
    fn read(&mut self, path: &str) -> Result<String, StoreError> {
        let resolved = self.resolve(path)?;
        let content = fs::read_to_string(&resolved).map_err(|source| StoreError::Io {
            path: path.to_string(),
            source,
        })?;
        self.snapshots.insert(resolved, xxh3_64(content.as_bytes()));
        Ok(content)
    }

    fn write(&mut self, path: &str, content: &str) -> Result<(), StoreError> {
        let resolved = self.resolve(path)?;

        // Each file is exclusively owned for the duration of one apply
        // operation; a hash mismatch means something else wrote to it
        // mid-escalation and the edit must not land.
        if let Some(expected) = self.snapshots.get(&resolved) {
            let current = fs::read(&resolved).map_err(|source| StoreError::Io {
                path: path.to_string(),
                source,
            })?;
            if xxh3_64(&current) != *expected {
                return Err(StoreError::ConcurrentModification(path.to_string()));
            }
        }

        if self.dry_run {
            return Ok(());
        }

        atomic_write(&resolved, content.as_bytes()).map_err(|source| StoreError::Io {
            path: path.to_string(),
            source,
        })?;
        self.snapshots.insert(resolved, xxh3_64(content.as_bytes()));
        Ok(())
    }
}

/// Atomic file write: tempfile in the same directory + fsync + rename,
/// then an mtime bump so incremental build tools notice the change.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    filetime::set_file_mtime(path, filetime::FileTime::now())?;
    Ok(())
}

/// In-memory store for tests and collaborator simulation.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    pub files: HashMap<String, String>,
}

impl MemStore {
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }
}

impl FileStore for MemStore {
    fn read(&mut self, path: &str) -> Result<String, StoreError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write(&mut self, path: &str, content: &str) -> Result<(), StoreError> {
        self.files.insert(path.to_string(), content.to_string());
        Ok(())
    }
}
