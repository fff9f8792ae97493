// src/dag/needrun.rs

//! Deciding which jobs must run, and why.
//!
//! Every unfinished job first gets an *initial* reason from its own state
//! (forced, missing outputs, newer inputs, drift). The need-run set is then
//! closed under two propagation rules, breadth-first:
//!
//! - a job supplying a currently missing artifact to a need-run job must run;
//! - a job consuming output of a need-run job must run.
//!
//! Finished jobs keep their reasons untouched and only seed propagation
//! towards their dependents.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::dag::artifact::ArtifactRef;
use crate::dag::dynamic::realized_wildcards;
use crate::dag::graph::JobGraph;
use crate::dag::job::{Job, JobId};
use crate::dag::reason::Reason;
use crate::dag::scheduler::SchedulerOptions;
use crate::dag::state::RunState;
use crate::persistence::Persistence;
use crate::store::ArtifactStore;

pub(crate) struct NeedRunAnalyzer<'a> {
    pub graph: &'a JobGraph,
    pub state: &'a mut RunState,
    pub store: &'a dyn ArtifactStore,
    pub persistence: &'a dyn Persistence,
    pub options: &'a SchedulerOptions,
    pub forced_artifacts: &'a BTreeSet<ArtifactRef>,
}

impl<'a> NeedRunAnalyzer<'a> {
    pub fn recompute(&mut self) {
        let graph = self.graph;

        // Start over for every unfinished job; finished jobs keep their reason.
        {
            let RunState {
                reasons,
                finished,
                needrun,
                ..
            } = &mut *self.state;
            reasons.retain(|id, _| finished.contains(id) && graph.contains(*id));
            needrun.retain(|id| finished.contains(id) && graph.contains(*id));
        }

        let mut times = AncestorTimes::new(graph, self.store);
        let mut queue: VecDeque<JobId> = VecDeque::new();
        let mut without_initial: BTreeSet<JobId> = BTreeSet::new();

        for job in graph.jobs() {
            let id = job.id();
            if self.state.is_finished(id) {
                if self.state.reason(id).is_some_and(|r| !r.is_empty()) {
                    queue.push_back(id);
                }
                continue;
            }

            let reason = self.initial_reason(job, &mut times);
            if reason.is_empty() {
                without_initial.insert(id);
            } else {
                queue.push_back(id);
            }
            self.state.reasons.insert(id, reason);
        }

        let mut visited: BTreeSet<JobId> = queue.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !self.state.is_finished(id) {
                for (producer, files) in graph.dependencies_of(id) {
                    if self.state.is_finished(*producer) {
                        continue;
                    }
                    let missing: Vec<ArtifactRef> = files
                        .iter()
                        .filter(|f| !output_exists(self.store, f))
                        .cloned()
                        .collect();
                    if missing.is_empty() {
                        continue;
                    }
                    self.reason_mut(*producer).missing_output.extend(missing);
                    if visited.insert(*producer) {
                        queue.push_back(*producer);
                    }
                }
            }

            for (consumer, files) in graph.dependents_of(id) {
                if self.state.is_finished(*consumer) {
                    continue;
                }
                self.reason_mut(*consumer)
                    .updated_input_run
                    .extend(files.iter().cloned());
                if visited.insert(*consumer) {
                    queue.push_back(*consumer);
                }
            }
        }

        for (id, reason) in self.state.reasons.iter_mut() {
            if self.state.finished.contains(id) {
                continue;
            }
            reason.derived = without_initial.contains(id) && !reason.is_empty();
        }

        self.state.needrun = self
            .state
            .reasons
            .iter()
            .filter(|(_, reason)| !reason.is_empty())
            .map(|(id, _)| *id)
            .collect();

        for id in &self.state.needrun {
            if let (Some(job), Some(reason)) = (graph.job(*id), self.state.reasons.get(id)) {
                if !self.state.finished.contains(id) {
                    debug!(job = %job, id = %id, reason = %reason, "job needs to run");
                }
            }
        }
        info!(
            jobs = graph.len(),
            needrun = self.state.needrun.len(),
            finished = self.state.finished.len(),
            "need-run analysis complete"
        );
    }

    fn reason_mut(&mut self, id: JobId) -> &mut Reason {
        self.state.reasons.entry(id).or_default()
    }

    fn initial_reason(&self, job: &Job, times: &mut AncestorTimes<'_>) -> Reason {
        let id = job.id();
        let mut reason = Reason::default();

        if self.is_forced(job) {
            reason.forced = true;
        } else if self.graph.is_target(id) && job.outputs().is_empty() {
            if job.inputs().is_empty() {
                reason.noio = true;
            } else {
                reason.nooutput = true;
            }
        } else {
            reason.missing_output = job
                .outputs()
                .iter()
                .filter(|o| !output_exists(self.store, o))
                .cloned()
                .collect();
        }

        if reason.is_empty() {
            self.drift(job, &mut reason);
        }

        if reason.is_empty() {
            if let Some(oldest) = oldest_output(self.store, job) {
                for input in job.inputs() {
                    if times.input_time(id, input).is_some_and(|t| t > oldest) {
                        reason.updated_input.insert(input.clone());
                    }
                }
            }
        }

        reason
    }

    fn is_forced(&self, job: &Job) -> bool {
        if self.state.omit_force.contains(&job.id()) {
            return false;
        }
        self.options.force_all
            || self.options.force.matches(job)
            || job
                .outputs()
                .iter()
                .any(|o| self.forced_artifacts.contains(o))
    }

    fn drift(&self, job: &Job, reason: &mut Reason) {
        if !self.options.rerun_on_code_change && !self.options.rerun_on_version_change {
            return;
        }
        for output in job.outputs() {
            if output.is_placeholder() || !self.store.exists(output) {
                continue;
            }
            if self.options.rerun_on_code_change && self.persistence.impl_changed(job, output) {
                reason.code_changed.insert(output.clone());
            }
            if self.options.rerun_on_version_change
                && self.persistence.version_changed(job, output)
            {
                reason.version_changed.insert(output.clone());
            }
        }
    }
}

/// Placeholders count as present once some realization exists.
pub(crate) fn output_exists(store: &dyn ArtifactStore, artifact: &ArtifactRef) -> bool {
    if artifact.is_placeholder() {
        !realized_wildcards(store, artifact).is_empty()
    } else {
        store.exists(artifact)
    }
}

fn mtime(store: &dyn ArtifactStore, artifact: &ArtifactRef) -> Option<SystemTime> {
    if artifact.is_placeholder() || !store.exists(artifact) {
        return None;
    }
    store.mtime(artifact).ok()
}

/// Timestamp of the oldest existing concrete output.
pub(crate) fn oldest_output(store: &dyn ArtifactStore, job: &Job) -> Option<SystemTime> {
    job.outputs().iter().filter_map(|o| mtime(store, o)).min()
}

/// Newest timestamp among a job's inputs and, transitively, the inputs of
/// every job upstream of it.
///
/// Values are memoised for the lifetime of one analysis only, so nothing has
/// to be invalidated when the graph is rewritten.
struct AncestorTimes<'a> {
    graph: &'a JobGraph,
    store: &'a dyn ArtifactStore,
    memo: BTreeMap<JobId, Option<SystemTime>>,
}

impl<'a> AncestorTimes<'a> {
    fn new(graph: &'a JobGraph, store: &'a dyn ArtifactStore) -> Self {
        Self {
            graph,
            store,
            memo: BTreeMap::new(),
        }
    }

    /// Effective time of `input` as seen by `job`: the input's own timestamp
    /// or anything newer upstream of its producer.
    fn input_time(&mut self, job: JobId, input: &ArtifactRef) -> Option<SystemTime> {
        let own = mtime(self.store, input);
        let upstream = self
            .producer_of(job, input)
            .and_then(|producer| self.job_time(producer));
        own.max(upstream)
    }

    fn producer_of(&self, job: JobId, input: &ArtifactRef) -> Option<JobId> {
        self.graph
            .dependencies_of(job)
            .iter()
            .find(|(_, files)| files.contains(input))
            .map(|(producer, _)| *producer)
    }

    /// Post-order traversal over dependencies with an explicit stack.
    fn job_time(&mut self, root: JobId) -> Option<SystemTime> {
        let mut stack: Vec<(JobId, bool)> = vec![(root, false)];
        let mut in_progress: BTreeSet<JobId> = BTreeSet::new();

        while let Some((id, expanded)) = stack.pop() {
            if self.memo.contains_key(&id) {
                continue;
            }
            if !expanded {
                if !in_progress.insert(id) {
                    continue;
                }
                stack.push((id, true));
                for producer in self.graph.dependencies_of(id).keys() {
                    if !self.memo.contains_key(producer) {
                        stack.push((*producer, false));
                    }
                }
                continue;
            }

            let time = self.graph.job(id).and_then(|job| {
                job.inputs()
                    .iter()
                    .map(|input| {
                        let upstream = self
                            .producer_of(id, input)
                            .and_then(|p| self.memo.get(&p).copied().flatten());
                        mtime(self.store, input).max(upstream)
                    })
                    .max()
                    .flatten()
            });
            self.memo.insert(id, time);
        }

        self.memo.get(&root).copied().flatten()
    }
}
