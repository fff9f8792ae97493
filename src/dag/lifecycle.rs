// src/dag/lifecycle.rs

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::dag::artifact::ArtifactRef;
use crate::dag::graph::Direction;
use crate::dag::job::JobId;
use crate::dag::readiness;
use crate::dag::scheduler::Scheduler;
use crate::errors::{JobdagError, Result};

impl Scheduler {
    /// Remove a job and both directions of its edges.
    ///
    /// With `recursive`, dependencies left without any dependent are removed
    /// too, except finished jobs and target jobs.
    pub fn delete_job(&mut self, job: JobId, recursive: bool) -> Result<()> {
        if !self.graph.contains(job) {
            return Err(JobdagError::JobNotFound(job));
        }
        self.remove_jobs(job, recursive, &BTreeSet::new());
        readiness::update_ready(&self.graph, &mut self.state);
        Ok(())
    }

    /// Prune `job` and every unfinished job downstream of it, then any
    /// dependency nobody consumes any more.
    ///
    /// Running jobs are not interrupted; that is up to the executor.
    pub fn cancel(&mut self, job: JobId) -> Result<()> {
        if !self.graph.contains(job) {
            return Err(JobdagError::JobNotFound(job));
        }
        let doomed = self.graph.bfs(Direction::Dependents, [job], |id| {
            self.state.is_finished(id)
        });
        info!(job = %job, jobs = doomed.len(), "cancelling jobs");
        for id in doomed {
            if self.graph.contains(id) {
                self.remove_jobs(id, true, &BTreeSet::new());
            }
        }
        readiness::update_ready(&self.graph, &mut self.state);
        Ok(())
    }

    /// Worklist deletion shared by `delete_job`, `cancel` and rewrites.
    /// Jobs in `keep` are never removed as orphans.
    pub(super) fn remove_jobs(&mut self, root: JobId, recursive: bool, keep: &BTreeSet<JobId>) -> Vec<JobId> {
        let mut removed = Vec::new();
        let mut worklist = vec![root];

        while let Some(id) = worklist.pop() {
            let Some(gone) = self.graph.remove_job(id) else {
                continue;
            };
            debug!(job = %gone.job, id = %id, "deleted job");
            self.state.forget(id);
            self.new_wildcards.remove(&id);
            removed.push(id);

            if !recursive {
                continue;
            }
            for dependency in gone.dependencies.keys() {
                let orphan = self.graph.contains(*dependency)
                    && self.graph.dependents_of(*dependency).is_empty()
                    && !self.state.is_finished(*dependency)
                    && !self.graph.is_target(*dependency)
                    && !keep.contains(dependency);
                if orphan {
                    worklist.push(*dependency);
                }
            }
        }
        removed
    }

    /// Drop every job no target depends on.
    pub(super) fn cleanup(&mut self) {
        let reachable = self.graph.reachable_from_targets();
        let unreachable: Vec<JobId> = self
            .graph
            .ids()
            .filter(|id| !reachable.contains(id))
            .collect();
        if unreachable.is_empty() {
            return;
        }
        for id in &unreachable {
            self.remove_jobs(*id, false, &BTreeSet::new());
        }
        debug!(jobs = unreachable.len(), "removed jobs unreachable from targets");
    }

    /// Remove temporary artifacts that no pending job still consumes.
    ///
    /// Candidates are the temporary inputs `job` received from its
    /// dependencies, plus its own temporary outputs unless the job is a
    /// target or still dynamic. Store errors are logged.
    pub fn collect_temporaries(&mut self, job: JobId) {
        if self.options.notemp {
            return;
        }
        let Some(current) = self.graph.job(job) else {
            return;
        };

        let mut candidates: Vec<(JobId, ArtifactRef)> = Vec::new();
        for (producer, artifacts) in self.graph.dependencies_of(job) {
            for artifact in artifacts.iter().filter(|a| a.is_temporary()) {
                candidates.push((*producer, artifact.clone()));
            }
        }
        if !current.dynamic_output() && !self.graph.is_target(job) {
            for output in current.outputs() {
                if output.is_temporary() && !self.target_artifacts.contains(output) {
                    candidates.push((job, output.clone()));
                }
            }
        }

        for (producer, artifact) in candidates {
            if self.still_needed(producer, &artifact) || !self.store.exists(&artifact) {
                continue;
            }
            match self.store.remove(&artifact) {
                Ok(()) => info!(artifact = %artifact, "removed temporary artifact"),
                Err(error) => warn!(
                    artifact = %artifact,
                    error = %error,
                    "failed to remove temporary artifact"
                ),
            }
        }
    }

    fn still_needed(&self, producer: JobId, artifact: &ArtifactRef) -> bool {
        self.graph
            .dependents_of(producer)
            .iter()
            .any(|(consumer, artifacts)| {
                artifacts.contains(artifact) && self.state.is_pending(*consumer)
            })
    }

    /// Write-protect every protected output of a finished job.
    pub fn protect(&mut self, job: JobId) {
        let Some(current) = self.graph.job(job) else {
            return;
        };
        for output in current.outputs() {
            if !output.is_protected() || output.is_placeholder() || !self.store.exists(output) {
                continue;
            }
            match self.store.protect(output) {
                Ok(()) => info!(job = %current, artifact = %output, "write-protected output"),
                Err(error) => warn!(
                    job = %current,
                    artifact = %output,
                    error = %error,
                    "failed to write-protect output"
                ),
            }
        }
    }
}
