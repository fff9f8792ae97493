// src/dag/matcher.rs

use std::collections::BTreeSet;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::dag::job::Job;
use crate::errors::{JobdagError, Result};

/// Selects jobs by rule name or by glob patterns over their outputs.
///
/// Used for forcing and for priority elevation.
#[derive(Debug, Clone)]
pub struct JobMatcher {
    rules: BTreeSet<String>,
    artifacts: GlobSet,
    patterns: Vec<String>,
}

impl JobMatcher {
    pub fn new<R, P>(rules: R, patterns: P) -> Result<Self>
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let rules: BTreeSet<String> = rules.into_iter().map(Into::into).collect();
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        let mut builder = GlobSetBuilder::new();
        for pat in &patterns {
            let glob = Glob::new(pat).map_err(|e| JobdagError::InvalidPattern {
                pattern: pat.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let artifacts = builder.build().map_err(|e| JobdagError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            rules,
            artifacts,
            patterns,
        })
    }

    pub fn rules<R>(rules: R) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            rules: rules.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.rules.contains(job.rule_name())
            || (!self.patterns.is_empty()
                && job
                    .outputs()
                    .iter()
                    .any(|o| self.artifacts.is_match(o.path())))
    }
}

impl Default for JobMatcher {
    fn default() -> Self {
        Self {
            rules: BTreeSet::new(),
            artifacts: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_glob_is_reported() {
        let err = JobMatcher::new(Vec::<String>::new(), ["results/[".to_string()]).unwrap_err();
        assert!(matches!(err, JobdagError::InvalidPattern { .. }));
    }

    #[test]
    fn empty_matcher() {
        assert!(JobMatcher::default().is_empty());
        assert!(!JobMatcher::rules(["report"]).is_empty());
    }
}
