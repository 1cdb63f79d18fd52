use super::{StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const PARTIAL_EXTENSION: &str = "partial";

/// A set of files that appear on disk together or not at all.
///
/// Each file is first written under `<name>.partial`; `commit` renames them
/// into place. Any failure, or dropping the set uncommitted, removes every
/// staged and already-renamed file of the set.
pub struct StagedFileSet {
    staged: Vec<(PathBuf, PathBuf)>,
    committed: Vec<PathBuf>,
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    PathBuf::from(name)
}

impl StagedFileSet {
    pub fn new() -> Self {
        Self {
            staged: Vec::new(),
            committed: Vec::new(),
        }
    }

    /// Write one file of the set through `write`, which receives the
    /// staging path
    pub fn stage<F>(&mut self, path: &Path, write: F) -> StorageResult<()>
    where
        F: FnOnce(&Path) -> StorageResult<()>,
    {
        let partial = partial_path(path);
        // registered first so a half-written file is cleaned up too
        self.staged.push((partial.clone(), path.to_path_buf()));
        if let Err(e) = write(&partial) {
            self.rollback();
            return Err(e);
        }
        Ok(())
    }

    pub fn commit(mut self) -> StorageResult<Vec<PathBuf>> {
        let staged = std::mem::take(&mut self.staged);
        for (index, (partial, target)) in staged.iter().enumerate() {
            if let Err(source) = fs::rename(partial, target) {
                self.staged = staged[index..].to_vec();
                self.rollback();
                return Err(StorageError::Io {
                    path: target.clone(),
                    source,
                });
            }
            self.committed.push(target.clone());
        }
        Ok(std::mem::take(&mut self.committed))
    }

    fn rollback(&mut self) {
        for path in self
            .staged
            .drain(..)
            .map(|(partial, _)| partial)
            .chain(self.committed.drain(..))
        {
            match fs::remove_file(&path) {
                Ok(()) => log::warn!("removed incomplete file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::error!("failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Default for StagedFileSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StagedFileSet {
    fn drop(&mut self) {
        self.rollback();
    }
}
