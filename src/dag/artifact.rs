// src/dag/artifact.rs

//! Artifact references.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Lifecycle flags attached to an artifact by the rule that declares it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArtifactFlags {
    /// Eligible for deletion once no unfinished consumer needs it.
    pub temporary: bool,
    /// Made read-only once produced.
    pub protected: bool,
    /// Placeholder for a family of artifacts named only after the producer ran.
    pub dynamic: bool,
}

/// Opaque identifier for a producible thing, typically a path relative to
/// the artifact store root.
///
/// Equality, ordering and hashing only consider the path: the same file
/// referenced as a temporary output and as a plain input is one artifact.
#[derive(Clone)]
pub struct ArtifactRef {
    path: Arc<str>,
    flags: ArtifactFlags,
}

impl ArtifactRef {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self::with_flags(path, ArtifactFlags::default())
    }

    pub fn with_flags(path: impl AsRef<str>, flags: ArtifactFlags) -> Self {
        Self {
            path: Arc::from(path.as_ref()),
            flags,
        }
    }

    pub fn temporary(path: impl AsRef<str>) -> Self {
        Self::with_flags(
            path,
            ArtifactFlags {
                temporary: true,
                ..ArtifactFlags::default()
            },
        )
    }

    pub fn protected(path: impl AsRef<str>) -> Self {
        Self::with_flags(
            path,
            ArtifactFlags {
                protected: true,
                ..ArtifactFlags::default()
            },
        )
    }

    pub fn dynamic(path: impl AsRef<str>) -> Self {
        Self::with_flags(
            path,
            ArtifactFlags {
                dynamic: true,
                ..ArtifactFlags::default()
            },
        )
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flags(&self) -> ArtifactFlags {
        self.flags
    }

    pub fn is_temporary(&self) -> bool {
        self.flags.temporary
    }

    pub fn is_protected(&self) -> bool {
        self.flags.protected
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.dynamic
    }

    /// Whether the path still contains an unexpanded `{wildcard}`.
    ///
    /// Placeholders never exist in a store; they are rewritten into concrete
    /// artifacts once their producer has run.
    pub fn is_placeholder(&self) -> bool {
        match self.path.find('{') {
            Some(open) => self.path[open..].contains('}'),
            None => false,
        }
    }
}

impl PartialEq for ArtifactRef {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ArtifactRef {}

impl Hash for ArtifactRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for ArtifactRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArtifactRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Debug for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags == ArtifactFlags::default() {
            write!(f, "{:?}", &*self.path)
        } else {
            write!(f, "{:?}{:?}", &*self.path, self.flags)
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for ArtifactRef {
    fn from(path: &str) -> Self {
        ArtifactRef::new(path)
    }
}

impl From<String> for ArtifactRef {
    fn from(path: String) -> Self {
        ArtifactRef::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_flags() {
        assert_eq!(ArtifactRef::temporary("a.txt"), ArtifactRef::new("a.txt"));
        assert!(ArtifactRef::temporary("a.txt").is_temporary());
    }

    #[test]
    fn detects_placeholders() {
        assert!(ArtifactRef::new("chunk_{i}.txt").is_placeholder());
        assert!(!ArtifactRef::new("chunk_1.txt").is_placeholder());
        assert!(!ArtifactRef::new("odd{name.txt").is_placeholder());
    }
}
