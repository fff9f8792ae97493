// src/dag/job.rs

//! Jobs: rules bound to concrete wildcard values.

use std::fmt;
use std::sync::Arc;

use crate::dag::artifact::ArtifactRef;
use crate::rules::{Rule, Wildcards};

/// Priority assigned by [`elevate`](crate::dag::Scheduler::elevate).
pub const HIGHEST_PRIORITY: i64 = i64::MAX;

/// Stable handle of a job inside one [`JobGraph`](crate::dag::JobGraph).
///
/// Handles are never reused within a graph, so a handle held by the executor
/// can at worst point at a deleted job, never at a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub(crate) u32);

impl JobId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a job independent of its handle: the rule name plus the
/// wildcard bindings. Resolving the same key twice yields the same job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub rule: String,
    pub wildcards: Wildcards,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rule)?;
        if !self.wildcards.is_empty() {
            let bindings = self
                .wildcards
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({bindings})")?;
        }
        Ok(())
    }
}

/// A rule instantiated with wildcard values, before it is placed in a graph.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub rule: Arc<Rule>,
    pub wildcards: Wildcards,
    pub inputs: Vec<ArtifactRef>,
    pub outputs: Vec<ArtifactRef>,
}

impl JobSpec {
    pub fn key(&self) -> JobKey {
        JobKey {
            rule: self.rule.name().to_string(),
            wildcards: self.wildcards.clone(),
        }
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key(), f)
    }
}

/// One concrete unit of work owned by the graph arena.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    rule: Arc<Rule>,
    wildcards: Wildcards,
    inputs: Vec<ArtifactRef>,
    outputs: Vec<ArtifactRef>,
    priority: i64,
}

impl Job {
    pub(crate) fn from_spec(id: JobId, spec: JobSpec) -> Self {
        let priority = spec.rule.priority();
        Self {
            id,
            rule: spec.rule,
            wildcards: spec.wildcards,
            inputs: spec.inputs,
            outputs: spec.outputs,
            priority,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    pub fn wildcards(&self) -> &Wildcards {
        &self.wildcards
    }

    pub fn inputs(&self) -> &[ArtifactRef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ArtifactRef] {
        &self.outputs
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: i64) {
        self.priority = priority;
    }

    /// Whether some output is a placeholder whose names are only known after
    /// the job ran.
    pub fn dynamic_output(&self) -> bool {
        self.outputs.iter().any(|o| o.is_dynamic())
    }

    /// Whether some input is a placeholder for a family of artifacts.
    pub fn dynamic_input(&self) -> bool {
        self.inputs.iter().any(|i| i.is_dynamic())
    }

    pub fn dynamic_outputs(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.outputs.iter().filter(|o| o.is_dynamic())
    }

    pub fn produces(&self, artifact: &ArtifactRef) -> bool {
        self.outputs.contains(artifact)
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            rule: self.rule.name().to_string(),
            wildcards: self.wildcards.clone(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key(), f)
    }
}
