// src/persistence/mod.rs

//! Metadata about earlier runs: which rule, version and code produced an
//! artifact, and whether that production was interrupted.

use std::collections::BTreeMap;
use std::fmt::Debug;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::dag::{ArtifactRef, Job};

pub mod file;

pub use file::FilePersistence;

/// Read access used during analysis plus write hooks used by the runtime.
pub trait Persistence: Send + Debug {
    /// Whether some output of `job` is marked as produced by an interrupted run.
    fn is_incomplete(&self, job: &Job) -> bool;
    /// Version recorded for the rule that last produced `artifact`.
    fn version(&self, artifact: &ArtifactRef) -> Option<String>;
    fn version_changed(&self, job: &Job, artifact: &ArtifactRef) -> bool;
    /// Whether the code of the job's rule differs from the code that
    /// produced `artifact`.
    fn impl_changed(&self, job: &Job, artifact: &ArtifactRef) -> bool;

    /// Mark the outputs of a job that is about to run as incomplete.
    fn started(&mut self, job: &Job) -> Result<()>;
    /// Record the provenance of a successfully finished job's outputs.
    fn finished(&mut self, job: &Job) -> Result<()>;
    /// Forget everything about the outputs of a failed job.
    fn cleanup(&mut self, job: &Job) -> Result<()>;
}

/// What is known about one produced artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub rule: String,
    #[serde(default)]
    pub version: Option<String>,
    /// blake3 fingerprint of the producing rule's code.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub incomplete: bool,
}

/// Artifact path → record. Shared by the in-memory and file-backed logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Records {
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactRecord>,
}

impl Records {
    pub fn get(&self, artifact: &ArtifactRef) -> Option<&ArtifactRecord> {
        self.artifacts.get(artifact.path())
    }

    fn recordable(job: &Job) -> impl Iterator<Item = &ArtifactRef> {
        job.outputs().iter().filter(|o| !o.is_placeholder())
    }

    pub fn is_incomplete(&self, job: &Job) -> bool {
        Self::recordable(job).any(|o| self.get(o).is_some_and(|r| r.incomplete))
    }

    pub fn version_changed(&self, job: &Job, artifact: &ArtifactRef) -> bool {
        self.get(artifact)
            .is_some_and(|r| r.version.as_deref() != job.rule().version())
    }

    pub fn impl_changed(&self, job: &Job, artifact: &ArtifactRef) -> bool {
        self.get(artifact)
            .is_some_and(|r| r.code != job.rule().code_fingerprint())
    }

    pub fn started(&mut self, job: &Job) {
        for output in Self::recordable(job) {
            self.artifacts
                .entry(output.path().to_string())
                .and_modify(|r| r.incomplete = true)
                .or_insert_with(|| ArtifactRecord {
                    rule: job.rule_name().to_string(),
                    version: None,
                    code: None,
                    incomplete: true,
                });
        }
    }

    pub fn finished(&mut self, job: &Job) {
        let version = job.rule().version().map(str::to_string);
        let code = job.rule().code_fingerprint();
        for output in Self::recordable(job) {
            self.artifacts.insert(
                output.path().to_string(),
                ArtifactRecord {
                    rule: job.rule_name().to_string(),
                    version: version.clone(),
                    code: code.clone(),
                    incomplete: false,
                },
            );
        }
    }

    pub fn cleanup(&mut self, job: &Job) {
        for output in Self::recordable(job) {
            self.artifacts.remove(output.path());
        }
    }
}

/// Records kept in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryPersistence {
    records: Records,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Seed a record, e.g. to simulate an earlier run.
    pub fn insert(&mut self, artifact: impl Into<String>, record: ArtifactRecord) {
        self.records.artifacts.insert(artifact.into(), record);
    }
}

impl Persistence for MemoryPersistence {
    fn is_incomplete(&self, job: &Job) -> bool {
        self.records.is_incomplete(job)
    }

    fn version(&self, artifact: &ArtifactRef) -> Option<String> {
        self.records.get(artifact).and_then(|r| r.version.clone())
    }

    fn version_changed(&self, job: &Job, artifact: &ArtifactRef) -> bool {
        self.records.version_changed(job, artifact)
    }

    fn impl_changed(&self, job: &Job, artifact: &ArtifactRef) -> bool {
        self.records.impl_changed(job, artifact)
    }

    fn started(&mut self, job: &Job) -> Result<()> {
        self.records.started(job);
        Ok(())
    }

    fn finished(&mut self, job: &Job) -> Result<()> {
        self.records.finished(job);
        Ok(())
    }

    fn cleanup(&mut self, job: &Job) -> Result<()> {
        self.records.cleanup(job);
        Ok(())
    }
}
