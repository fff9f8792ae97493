// src/store/mod.rs

//! Where artifacts live.
//!
//! The scheduler only asks the store about existence and timestamps while
//! analysing the graph; `remove` and `protect` are used after jobs finish.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::dag::ArtifactRef;

pub mod mock;

pub use mock::MemoryArtifactStore;

/// Abstract artifact storage.
pub trait ArtifactStore: Send + Sync + Debug {
    fn exists(&self, artifact: &ArtifactRef) -> bool;
    fn mtime(&self, artifact: &ArtifactRef) -> Result<SystemTime>;
    fn remove(&self, artifact: &ArtifactRef) -> Result<()>;
    /// Make the artifact read-only.
    fn protect(&self, artifact: &ArtifactRef) -> Result<()>;

    /// Every stored path starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Artifacts are files below a root directory; artifact paths use `/`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(artifact.path())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, artifact: &ArtifactRef) -> bool {
        self.path_of(artifact).exists()
    }

    fn mtime(&self, artifact: &ArtifactRef) -> Result<SystemTime> {
        let path = self.path_of(artifact);
        let meta = fs::metadata(&path).with_context(|| format!("reading metadata of {:?}", path))?;
        meta.modified()
            .with_context(|| format!("reading modification time of {:?}", path))
    }

    fn remove(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.path_of(artifact);
        if path.is_dir() {
            fs::remove_dir_all(&path).with_context(|| format!("removing directory {:?}", path))
        } else {
            fs::remove_file(&path).with_context(|| format!("removing file {:?}", path))
        }
    }

    fn protect(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.path_of(artifact);
        let mut perms = fs::metadata(&path)
            .with_context(|| format!("reading metadata of {:?}", path))?
            .permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms)
            .with_context(|| format!("write-protecting {:?}", path))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Start at the deepest directory named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = self.root.join(dir_part);
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).with_context(|| format!("reading dir {:?}", dir))? {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if relative.starts_with(prefix) {
                    found.push(relative);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}
