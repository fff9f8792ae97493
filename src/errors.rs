// src/errors.rs

//! Crate-wide error types.
//!
//! [`ResolveError`] covers failures while building the job graph and is
//! cheap to clone so that the resolver can collect per-candidate failures.
//! [`JobdagError`] is the top-level error returned by the public API.

use std::fmt;

use thiserror::Error;

use crate::dag::{ArtifactRef, JobId};

/// Failure to resolve an artifact or job into a dependency subgraph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no rule can produce '{artifact}' and it does not exist")]
    MissingRule { artifact: ArtifactRef },

    #[error(
        "rules are ambiguous for '{artifact}': '{first}' and '{second}' are equally specific"
    )]
    AmbiguousRule {
        artifact: ArtifactRef,
        first: String,
        second: String,
    },

    #[error("cyclic dependency: job '{job}' would consume '{artifact}' while producing it")]
    CyclicGraph { job: String, artifact: ArtifactRef },

    #[error("missing input for job '{job}': {}", join(.artifacts))]
    MissingInput {
        job: String,
        artifacts: Vec<ArtifactRef>,
    },

    #[error("rule '{rule}' cannot be instantiated: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("every candidate failed: {}", join(.0))]
    Multiple(Vec<ResolveError>),
}

impl ResolveError {
    /// Whether an artifact that already exists may be used in place of the
    /// producer that failed to resolve. Ambiguity and broken rules are
    /// reported even then.
    pub fn allows_existing(&self) -> bool {
        match self {
            ResolveError::MissingRule { .. }
            | ResolveError::MissingInput { .. }
            | ResolveError::CyclicGraph { .. } => true,
            ResolveError::AmbiguousRule { .. } | ResolveError::InvalidRule { .. } => false,
            ResolveError::Multiple(errors) => errors.iter().all(ResolveError::allows_existing),
        }
    }
}

/// A requested target that could not be resolved, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetError {
    pub target: String,
    pub error: ResolveError,
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

#[derive(Error, Debug)]
pub enum JobdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{} target(s) could not be resolved: {}", .0.len(), join(.0))]
    UnresolvedTargets(Vec<TargetError>),

    #[error(
        "job '{job}' finished but its outputs are not valid (missing: [{}], older than input: [{}])",
        join(.missing),
        join(.stale)
    )]
    MissingOutput {
        job: String,
        missing: Vec<ArtifactRef>,
        stale: Vec<ArtifactRef>,
    },

    #[error(
        "artifacts from an incomplete earlier run: {}; rerun with force_incomplete to rebuild them",
        join(.artifacts)
    )]
    IncompleteRun { artifacts: Vec<ArtifactRef> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobdagError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_rule() -> ResolveError {
        ResolveError::MissingRule {
            artifact: ArtifactRef::new("a.txt"),
        }
    }

    fn ambiguous() -> ResolveError {
        ResolveError::AmbiguousRule {
            artifact: ArtifactRef::new("out.txt"),
            first: "first".to_string(),
            second: "second".to_string(),
        }
    }

    #[test]
    fn ambiguity_is_never_replaced_by_an_existing_artifact() {
        assert!(missing_rule().allows_existing());
        assert!(!ambiguous().allows_existing());
        assert!(ResolveError::Multiple(vec![missing_rule(), missing_rule()]).allows_existing());
        assert!(!ResolveError::Multiple(vec![missing_rule(), ambiguous()]).allows_existing());
    }
}
