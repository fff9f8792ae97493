// src/store/mock.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use anyhow::{Result, anyhow};

use super::ArtifactStore;
use crate::dag::ArtifactRef;

#[derive(Debug, Clone, Copy)]
struct MockEntry {
    /// Logical seconds since the epoch.
    modified: u64,
    protected: bool,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<String, MockEntry>,
    clock: u64,
}

/// In-memory store with a logical clock: every write is strictly newer than
/// the previous one, which makes timestamp comparisons deterministic.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    state: Arc<Mutex<MockState>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or overwrite an artifact with the next clock tick.
    pub fn add(&self, path: impl AsRef<str>) {
        let mut state = self.lock();
        state.clock += 1;
        let modified = state.clock;
        state.entries.insert(
            path.as_ref().to_string(),
            MockEntry {
                modified,
                protected: false,
            },
        );
    }

    /// Create or overwrite an artifact with an explicit timestamp.
    pub fn add_at(&self, path: impl AsRef<str>, modified: u64) {
        let mut state = self.lock();
        state.clock = state.clock.max(modified);
        state.entries.insert(
            path.as_ref().to_string(),
            MockEntry {
                modified,
                protected: false,
            },
        );
    }

    /// Bump an existing artifact to the next clock tick.
    pub fn touch(&self, path: impl AsRef<str>) -> Result<()> {
        let mut state = self.lock();
        state.clock += 1;
        let now = state.clock;
        match state.entries.get_mut(path.as_ref()) {
            Some(entry) => {
                entry.modified = now;
                Ok(())
            }
            None => Err(anyhow!("artifact not found: {}", path.as_ref())),
        }
    }

    pub fn contains(&self, path: impl AsRef<str>) -> bool {
        self.lock().entries.contains_key(path.as_ref())
    }

    pub fn is_protected(&self, path: impl AsRef<str>) -> bool {
        self.lock()
            .entries
            .get(path.as_ref())
            .is_some_and(|e| e.protected)
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, artifact: &ArtifactRef) -> bool {
        self.contains(artifact.path())
    }

    fn mtime(&self, artifact: &ArtifactRef) -> Result<SystemTime> {
        let state = self.lock();
        let entry = state
            .entries
            .get(artifact.path())
            .ok_or_else(|| anyhow!("artifact not found: {}", artifact))?;
        Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(entry.modified))
    }

    fn remove(&self, artifact: &ArtifactRef) -> Result<()> {
        let mut state = self.lock();
        match state.entries.get(artifact.path()) {
            Some(entry) if entry.protected => {
                Err(anyhow!("artifact is write-protected: {}", artifact))
            }
            Some(_) => {
                state.entries.remove(artifact.path());
                Ok(())
            }
            None => Err(anyhow!("artifact not found: {}", artifact)),
        }
    }

    fn protect(&self, artifact: &ArtifactRef) -> Result<()> {
        let mut state = self.lock();
        let entry = state
            .entries
            .get_mut(artifact.path())
            .ok_or_else(|| anyhow!("artifact not found: {}", artifact))?;
        entry.protected = true;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .entries
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_orders_writes() {
        let store = MemoryArtifactStore::new();
        store.add("a.txt");
        store.add("b.txt");
        let a = store.mtime(&ArtifactRef::new("a.txt")).unwrap();
        let b = store.mtime(&ArtifactRef::new("b.txt")).unwrap();
        assert!(b > a);

        store.touch("a.txt").unwrap();
        assert!(store.mtime(&ArtifactRef::new("a.txt")).unwrap() > b);
    }

    #[test]
    fn protected_artifacts_cannot_be_removed() {
        let store = MemoryArtifactStore::new();
        store.add("a.txt");
        let a = ArtifactRef::new("a.txt");
        store.protect(&a).unwrap();
        assert!(store.is_protected("a.txt"));
        assert!(store.remove(&a).is_err());
        assert!(store.exists(&a));
    }
}
