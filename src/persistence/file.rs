// src/persistence/file.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{Persistence, Records};
use crate::dag::{ArtifactRef, Job};

/// Relative path (from the store root) to the records file.
///
/// The effective path on disk is `<root>/.jobdag/records.toml`.
pub const RECORDS_FILE_PATH: &str = ".jobdag/records.toml";

fn records_file_path(root: &Path) -> PathBuf {
    root.join(RECORDS_FILE_PATH)
}

/// Stores records in `.jobdag/records.toml`, rewritten after every change.
#[derive(Debug)]
pub struct FilePersistence {
    path: PathBuf,
    records: Records,
}

impl FilePersistence {
    /// Open the log below `root`, loading existing records if present.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let path = records_file_path(root.as_ref());
        let records = load_records(&path)?;
        debug!(path = ?path, artifacts = records.artifacts.len(), "loaded persistence records");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating records directory at {:?}", parent))?;
        }
        let contents = toml::to_string(&self.records).context("serialising persistence records")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("writing records file at {:?}", self.path))?;
        Ok(())
    }
}

impl Persistence for FilePersistence {
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
        self.save()
    }

    fn finished(&mut self, job: &Job) -> Result<()> {
        self.records.finished(job);
        self.save()?;
        info!(job = %job, "recorded provenance of job outputs (file)");
        Ok(())
    }

    fn cleanup(&mut self, job: &Job) -> Result<()> {
        self.records.cleanup(job);
        self.save()
    }
}

fn load_records(path: &Path) -> Result<Records> {
    if !path.exists() {
        return Ok(Records::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading records file at {:?}", path))?;
    toml::from_str(&contents).with_context(|| format!("parsing records file at {:?}", path))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dag::JobGraph;
    use crate::rules::{Rule, Wildcards};

    fn job(graph: &mut JobGraph, version: &str) -> crate::dag::JobId {
        let rule = Arc::new(
            Rule::builder("clean")
                .output("clean.csv")
                .version(version)
                .code("clean it")
                .build()
                .unwrap(),
        );
        let spec = rule.instantiate(&Wildcards::new()).unwrap();
        graph.insert_job(spec)
    }

    #[test]
    fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = JobGraph::new();
        let id = job(&mut graph, "1");
        let clean = graph.job(id).unwrap();

        let mut log = FilePersistence::open(dir.path()).unwrap();
        log.started(clean).unwrap();
        assert!(log.is_incomplete(clean));
        log.finished(clean).unwrap();

        let reopened = FilePersistence::open(dir.path()).unwrap();
        assert!(!reopened.is_incomplete(clean));
        assert_eq!(reopened.version(&ArtifactRef::new("clean.csv")), Some("1".to_string()));
        assert!(!reopened.impl_changed(clean, &ArtifactRef::new("clean.csv")));

        let newer = job(&mut graph, "2");
        assert!(reopened.version_changed(graph.job(newer).unwrap(), &ArtifactRef::new("clean.csv")));
    }

    #[test]
    fn started_without_finish_stays_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = JobGraph::new();
        let id = job(&mut graph, "1");

        let mut log = FilePersistence::open(dir.path()).unwrap();
        log.started(graph.job(id).unwrap()).unwrap();

        let reopened = FilePersistence::open(dir.path()).unwrap();
        assert!(reopened.is_incomplete(graph.job(id).unwrap()));
        assert!(reopened.path().ends_with(RECORDS_FILE_PATH));
    }
}
