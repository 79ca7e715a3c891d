//! Working directory lifecycle: reset before extraction, removed when the [`Workspace`] drops.

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};

use crate::Key;

#[derive(Debug, thiserror::Error)]
#[error("couldn't remove folder {}: {source}", .path.display())]
pub struct WorkspaceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Resolves key directories under one root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &Key) -> PathBuf {
        self.root.join(key)
    }

    /// Remove whatever is at the key's path (absent is fine) and hand back the owning [`Workspace`].
    /// Call only while holding the key's lock. Blocking: async callers go through `spawn_blocking`.
    pub fn reset(&self, key: &Key) -> Result<Workspace, WorkspaceError> {
        let path = self.path_for(key);
        remove_path(&path).map_err(|source| WorkspaceError {
            path: path.clone(),
            source,
        })?;
        debug!("workspace reset: {}", path.display());
        Ok(Workspace { path })
    }

    /// Best-effort removal; failures are logged, never returned.
    pub fn destroy(&self, key: &Key) {
        destroy_path(&self.path_for(key));
    }
}

/// A reset key directory. Removed exactly once, when this value drops.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        destroy_path(&self.path);
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let res = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match res {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn destroy_path(path: &Path) {
    match remove_path(path) {
        Ok(()) => debug!("workspace removed: {}", path.display()),
        Err(e) => warn!("couldn't remove workspace {}: {}", path.display(), e),
    }
}
