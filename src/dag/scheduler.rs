// src/dag/scheduler.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::dag::artifact::ArtifactRef;
use crate::dag::graph::JobGraph;
use crate::dag::job::{Job, JobId};
use crate::dag::matcher::JobMatcher;
use crate::dag::needrun::NeedRunAnalyzer;
use crate::dag::reason::Reason;
use crate::dag::resolver::{Resolver, Target};
use crate::dag::state::RunState;
use crate::dag::{priority, readiness};
use crate::errors::{JobdagError, Result, TargetError};
use crate::persistence::Persistence;
use crate::rules::{Catalog, Wildcards};
use crate::store::ArtifactStore;

/// Knobs of one scheduler instance.
#[derive(Debug, Clone, Default)]
pub struct SchedulerOptions {
    /// Accept the first of several equally specific producers.
    pub ignore_ambiguity: bool,
    pub force: JobMatcher,
    pub force_all: bool,
    pub priority: JobMatcher,
    pub force_incomplete: bool,
    pub ignore_incomplete: bool,
    /// Never remove temporary artifacts.
    pub notemp: bool,
    pub rerun_on_code_change: bool,
    pub rerun_on_version_change: bool,
}

impl SchedulerOptions {
    /// Compile the force and priority matchers of a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self {
            ignore_ambiguity: cfg.config.ignore_ambiguity,
            force: JobMatcher::new(cfg.force.rules.iter().cloned(), cfg.force.artifacts.iter().cloned())?,
            force_all: cfg.force.all,
            priority: JobMatcher::new(
                cfg.priority.rules.iter().cloned(),
                cfg.priority.artifacts.iter().cloned(),
            )?,
            force_incomplete: cfg.config.force_incomplete,
            ignore_incomplete: cfg.config.ignore_incomplete,
            notemp: cfg.config.notemp,
            rerun_on_code_change: cfg.config.rerun_on_code_change,
            rerun_on_version_change: cfg.config.rerun_on_version_change,
        })
    }
}

/// One engine instance: the job graph, its state sets and the collaborators
/// used to build and maintain them.
///
/// The scheduler is responsible for:
/// - resolving requested targets into a job graph
/// - deciding which jobs need to run, and why
/// - exposing the ready frontier and advancing it on [`finish`](Self::finish)
/// - rewriting jobs whose outputs were only known after they ran
/// - pruning jobs and temporary artifacts that are no longer needed
///
/// All mutation goes through `&mut self`; whoever owns the scheduler
/// serializes calls to `finish`.
pub struct Scheduler {
    pub(super) graph: JobGraph,
    pub(super) state: RunState,
    pub(super) catalog: Box<dyn Catalog>,
    pub(super) store: Arc<dyn ArtifactStore>,
    pub(super) persistence: Box<dyn Persistence>,
    pub(super) options: SchedulerOptions,
    /// Artifacts requested directly by the caller.
    pub(super) target_artifacts: BTreeSet<ArtifactRef>,
    /// Artifacts whose producers are forced on top of `options.force`.
    pub(super) forced_artifacts: BTreeSet<ArtifactRef>,
    /// Bindings realized by dynamic rewrites, keyed by the replacement job.
    pub(super) new_wildcards: BTreeMap<JobId, Vec<Wildcards>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.graph.len())
            .field("state", &self.state)
            .field("options", &self.options)
            .field("target_artifacts", &self.target_artifacts)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        catalog: impl Catalog + 'static,
        store: Arc<dyn ArtifactStore>,
        persistence: impl Persistence + 'static,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            graph: JobGraph::new(),
            state: RunState::default(),
            catalog: Box::new(catalog),
            store,
            persistence: Box::new(persistence),
            options,
            target_artifacts: BTreeSet::new(),
            forced_artifacts: BTreeSet::new(),
            new_wildcards: BTreeMap::new(),
        }
    }

    /// Resolve `targets`, analyse which jobs need to run and compute the
    /// initial frontier.
    ///
    /// Every target is attempted; failures are reported together.
    pub fn build(&mut self, targets: &[Target]) -> Result<()> {
        let mut failures = Vec::new();

        for target in targets {
            let outcome = self.resolver().resolve(target);
            match outcome {
                Ok(job) => {
                    if let Target::Artifact(artifact) = target {
                        self.target_artifacts.insert(artifact.clone());
                    }
                    if let Some(job) = job {
                        self.graph.add_target(job);
                        debug!(target = %target, job = %job, "target resolved");
                    }
                }
                Err(error) => {
                    warn!(target = %target, error = %error, "target cannot be resolved");
                    failures.push(TargetError {
                        target: target.to_string(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(JobdagError::UnresolvedTargets(failures));
        }

        self.postprocess();
        self.check_incomplete()?;
        self.check_dynamic()?;

        info!(
            jobs = self.graph.len(),
            needrun = self.state.needrun.len(),
            ready = self.state.ready.len(),
            "job graph built"
        );
        Ok(())
    }

    pub(super) fn resolver(&mut self) -> Resolver<'_> {
        Resolver::new(
            &mut self.graph,
            &mut self.state,
            &*self.catalog,
            &*self.store,
            self.options.ignore_ambiguity,
        )
    }

    /// Drop unreachable jobs, redo the need-run analysis, raise priorities
    /// and rebuild the frontier.
    pub(super) fn postprocess(&mut self) {
        self.cleanup();
        self.recompute();
        self.elevate();
        readiness::update_ready(&self.graph, &mut self.state);
    }

    /// Recompute need-run membership and reasons for every unfinished job.
    pub fn recompute(&mut self) {
        NeedRunAnalyzer {
            graph: &self.graph,
            state: &mut self.state,
            store: &*self.store,
            persistence: &*self.persistence,
            options: &self.options,
            forced_artifacts: &self.forced_artifacts,
        }
        .recompute();
    }

    /// Raise priorities of jobs selected by the configured priority matcher.
    pub fn elevate(&mut self) {
        let elevated = priority::elevate(&mut self.graph, &self.state, &self.options.priority);
        if elevated > 0 {
            info!(jobs = elevated, "elevated job priorities");
        }
    }

    fn check_incomplete(&mut self) -> Result<()> {
        if self.options.ignore_incomplete {
            return Ok(());
        }

        let mut incomplete: BTreeSet<ArtifactRef> = BTreeSet::new();
        for job in self.graph.jobs() {
            if self.state.is_needrun(job.id()) || !self.persistence.is_incomplete(job) {
                continue;
            }
            incomplete.extend(
                job.outputs()
                    .iter()
                    .filter(|o| !o.is_placeholder() && self.store.exists(o))
                    .cloned(),
            );
        }

        if incomplete.is_empty() {
            return Ok(());
        }
        if self.options.force_incomplete {
            info!(
                artifacts = incomplete.len(),
                "forcing artifacts left behind by an incomplete run"
            );
            self.forced_artifacts.extend(incomplete);
            self.postprocess();
            return Ok(());
        }
        Err(JobdagError::IncompleteRun {
            artifacts: incomplete.into_iter().collect(),
        })
    }

    /// Rewrite dynamic jobs that need no run because their outputs were
    /// realized by an earlier session.
    fn check_dynamic(&mut self) -> Result<()> {
        let candidates: Vec<JobId> = self
            .graph
            .jobs()
            .filter(|job| job.dynamic_output() && !self.state.is_needrun(job.id()))
            .map(|job| job.id())
            .collect();

        let mut rewritten = false;
        for id in candidates {
            if self.graph.contains(id) && self.rewrite(id)?.is_some() {
                rewritten = true;
            }
        }
        if rewritten {
            self.postprocess();
        }
        Ok(())
    }

    /// Ready jobs ordered by descending priority, then by handle.
    pub fn initial_frontier(&self) -> Vec<JobId> {
        self.sorted_by_priority(self.state.ready.iter().copied())
    }

    fn sorted_by_priority(&self, ids: impl Iterator<Item = JobId>) -> Vec<JobId> {
        let mut ids: Vec<JobId> = ids.collect();
        ids.sort_by_key(|id| {
            let priority = self.graph.job(*id).map(Job::priority).unwrap_or(i64::MIN);
            (std::cmp::Reverse(priority), *id)
        });
        ids
    }

    /// Mark `job` as finished and return the jobs that became ready.
    ///
    /// With `update_dynamic`, a job with placeholder outputs is first
    /// rewritten into its concrete form; the replacement is what ends up
    /// finished. Protected outputs are write-protected and temporary
    /// artifacts nobody needs any more are removed.
    pub fn finish(&mut self, job: JobId, update_dynamic: bool) -> Result<Vec<JobId>> {
        let Some(current) = self.graph.job(job) else {
            return Err(JobdagError::JobNotFound(job));
        };
        if self.state.is_finished(job) {
            warn!(job = %current, "job finished twice; ignoring");
            return Ok(Vec::new());
        }

        let before = self.state.ready.clone();
        let mut finished = job;
        let mut rewritten = false;

        if update_dynamic && current.dynamic_output() {
            if let Some(replacement) = self.rewrite(job)? {
                self.state.omit_force.insert(replacement);
                finished = replacement;
                rewritten = true;
            }
        }

        readiness::mark_finished(&self.graph, &mut self.state, finished);
        if let Some(job) = self.graph.job(finished) {
            info!(job = %job, id = %finished, "job finished");
        }

        if rewritten {
            self.postprocess();
        }

        self.protect(finished);
        self.collect_temporaries(finished);

        let newly_ready = self
            .state
            .ready
            .iter()
            .copied()
            .filter(|id| !before.contains(id));
        Ok(self.sorted_by_priority(newly_ready))
    }

    /// Verify the outputs of a finished job: each must exist and must not be
    /// older than the newest input.
    pub fn check_outputs(&self, job: JobId) -> Result<()> {
        let Some(current) = self.graph.job(job) else {
            return Err(JobdagError::JobNotFound(job));
        };
        let store = &*self.store;

        let missing: Vec<ArtifactRef> = current
            .outputs()
            .iter()
            .filter(|o| !o.is_placeholder() && !store.exists(o))
            .cloned()
            .collect();

        let newest_input = current
            .inputs()
            .iter()
            .filter(|i| !i.is_placeholder() && store.exists(i))
            .filter_map(|i| store.mtime(i).ok())
            .max();
        let stale: Vec<ArtifactRef> = match newest_input {
            Some(newest) => current
                .outputs()
                .iter()
                .filter(|o| !o.is_placeholder() && store.exists(o))
                .filter(|o| store.mtime(o).is_ok_and(|t| t < newest))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if missing.is_empty() && stale.is_empty() {
            return Ok(());
        }
        Err(JobdagError::MissingOutput {
            job: current.to_string(),
            missing,
            stale,
        })
    }

    /// Mark outputs of a job about to run as incomplete.
    pub fn record_started(&mut self, job: JobId) -> Result<()> {
        let current = self.graph.job(job).ok_or(JobdagError::JobNotFound(job))?;
        self.persistence.started(current)?;
        Ok(())
    }

    /// Record provenance of a job whose outputs were verified.
    pub fn record_success(&mut self, job: JobId) -> Result<()> {
        let current = self.graph.job(job).ok_or(JobdagError::JobNotFound(job))?;
        self.persistence.finished(current)?;
        Ok(())
    }

    /// Remove whatever a failed job left behind and forget its records.
    ///
    /// The job stays in need-run; it is never marked finished.
    pub fn record_failure(&mut self, job: JobId) -> Result<()> {
        let current = self.graph.job(job).ok_or(JobdagError::JobNotFound(job))?;
        for output in current.outputs() {
            if output.is_placeholder() || !self.store.exists(output) {
                continue;
            }
            match self.store.remove(output) {
                Ok(()) => info!(job = %current, artifact = %output, "removed output of failed job"),
                Err(error) => warn!(
                    job = %current,
                    artifact = %output,
                    error = %error,
                    "failed to remove output of failed job"
                ),
            }
        }
        self.persistence.cleanup(current)?;
        Ok(())
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.graph.job(id)
    }

    /// Every job, producers before consumers.
    pub fn jobs(&self) -> Vec<&Job> {
        self.graph
            .topological_order()
            .into_iter()
            .filter_map(|id| self.graph.job(id))
            .collect()
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Ready jobs, highest priority first.
    pub fn ready_jobs(&self) -> Vec<&Job> {
        self.initial_frontier()
            .into_iter()
            .filter_map(|id| self.graph.job(id))
            .collect()
    }

    pub fn needrun_jobs(&self) -> impl Iterator<Item = &Job> {
        self.state.needrun.iter().filter_map(|id| self.graph.job(*id))
    }

    pub fn finished_jobs(&self) -> impl Iterator<Item = &Job> {
        self.state.finished.iter().filter_map(|id| self.graph.job(*id))
    }

    pub fn reason(&self, job: JobId) -> Option<&Reason> {
        self.state.reason(job)
    }

    /// Bindings realized when `job` replaced a dynamic placeholder.
    pub fn new_wildcards(&self, job: JobId) -> Option<&[Wildcards]> {
        self.new_wildcards.get(&job).map(Vec::as_slice)
    }

    pub fn is_needrun(&self, job: JobId) -> bool {
        self.state.is_needrun(job)
    }

    pub fn is_finished(&self, job: JobId) -> bool {
        self.state.is_finished(job)
    }

    pub fn is_ready(&self, job: JobId) -> bool {
        self.state.ready.contains(&job)
    }

    /// Whether every job that needs to run has finished.
    pub fn is_done(&self) -> bool {
        self.state.needrun.is_subset(&self.state.finished)
    }

    /// Existing outputs whose recorded version differs from their rule's.
    pub fn version_changes(&self) -> Vec<ArtifactRef> {
        self.drifted(|persistence, job, output| persistence.version_changed(job, output))
    }

    /// Existing outputs produced by different rule code.
    pub fn code_changes(&self) -> Vec<ArtifactRef> {
        self.drifted(|persistence, job, output| persistence.impl_changed(job, output))
    }

    fn drifted<F>(&self, changed: F) -> Vec<ArtifactRef>
    where
        F: Fn(&dyn Persistence, &Job, &ArtifactRef) -> bool,
    {
        let mut drifted = Vec::new();
        for job in self.graph.jobs() {
            for output in job.outputs() {
                if output.is_placeholder() || !self.store.exists(output) {
                    continue;
                }
                if changed(&*self.persistence, job, output) {
                    drifted.push(output.clone());
                }
            }
        }
        drifted
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn target_artifacts(&self) -> &BTreeSet<ArtifactRef> {
        &self.target_artifacts
    }
}
