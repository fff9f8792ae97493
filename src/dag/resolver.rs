// src/dag/resolver.rs

//! Turning requested artifacts or jobs into a dependency subgraph.
//!
//! Resolution is depth-first but runs on an explicit stack of frames so that
//! deep graphs cannot exhaust the thread stack. Two frame kinds alternate:
//!
//! - a *choice* frame picks a producer for one artifact among the catalog's
//!   candidates, most specific first;
//! - a *job* frame resolves the inputs of one job and attaches the chosen
//!   producers as dependencies once all inputs are settled.
//!
//! A child frame hands its result to its parent when it completes.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::dag::artifact::ArtifactRef;
use crate::dag::graph::JobGraph;
use crate::dag::job::{JobId, JobKey, JobSpec};
use crate::dag::state::RunState;
use crate::errors::ResolveError;
use crate::rules::{Catalog, RuleBinding};
use crate::store::ArtifactStore;

/// Something a caller asks the engine to produce.
#[derive(Debug, Clone)]
pub enum Target {
    Artifact(ArtifactRef),
    Job(RuleBinding),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Artifact(artifact) => write!(f, "{artifact}"),
            Target::Job(binding) => {
                let key = JobKey {
                    rule: binding.rule.name().to_string(),
                    wildcards: binding.wildcards.clone(),
                };
                write!(f, "{key}")
            }
        }
    }
}

impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Target::Artifact(ArtifactRef::new(path))
    }
}

impl From<ArtifactRef> for Target {
    fn from(artifact: ArtifactRef) -> Self {
        Target::Artifact(artifact)
    }
}

impl From<RuleBinding> for Target {
    fn from(binding: RuleBinding) -> Self {
        Target::Job(binding)
    }
}

/// Keys of the jobs on the current resolution path.
type Visited = BTreeSet<JobKey>;

type Outcome = Result<JobId, ResolveError>;

enum Step {
    Push(Frame),
    Done(Outcome),
}

enum Frame {
    Choice(ChoiceFrame),
    Job(JobFrame),
}

struct ChoiceFrame {
    artifact: ArtifactRef,
    /// Sorted by descending specificity.
    candidates: Vec<RuleBinding>,
    next: usize,
    /// Candidate index currently being resolved by a child frame.
    pending: Option<usize>,
    /// First successful candidate and its index.
    producer: Option<(JobId, usize)>,
    errors: Vec<ResolveError>,
    cycles: Vec<String>,
    visited: Visited,
    skip_until_dynamic: bool,
}

impl ChoiceFrame {
    fn new(
        artifact: ArtifactRef,
        candidates: Vec<RuleBinding>,
        visited: Visited,
        skip_until_dynamic: bool,
    ) -> Self {
        Self {
            artifact,
            candidates,
            next: 0,
            pending: None,
            producer: None,
            errors: Vec::new(),
            cycles: Vec::new(),
            visited,
            skip_until_dynamic,
        }
    }
}

struct JobFrame {
    job: JobId,
    name: String,
    inputs: Vec<ArtifactRef>,
    next: usize,
    /// Input currently being resolved by a child frame.
    pending: Option<ArtifactRef>,
    producers: Vec<(ArtifactRef, JobId)>,
    /// Inputs that do not exist in the store.
    missing: BTreeSet<ArtifactRef>,
    visited: Visited,
    /// Job lies between a dynamic consumer and its dynamic producer.
    skip_until_dynamic: bool,
}

/// Borrowing view of the scheduler used while resolving.
pub(crate) struct Resolver<'a> {
    graph: &'a mut JobGraph,
    state: &'a mut RunState,
    catalog: &'a dyn Catalog,
    store: &'a dyn ArtifactStore,
    ignore_ambiguity: bool,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        graph: &'a mut JobGraph,
        state: &'a mut RunState,
        catalog: &'a dyn Catalog,
        store: &'a dyn ArtifactStore,
        ignore_ambiguity: bool,
    ) -> Self {
        Self {
            graph,
            state,
            catalog,
            store,
            ignore_ambiguity,
        }
    }

    /// Resolve a target into a job.
    ///
    /// `Ok(None)` means the target is an existing artifact that needs no job.
    pub(crate) fn resolve(&mut self, target: &Target) -> Result<Option<JobId>, ResolveError> {
        match target {
            Target::Job(binding) => self.resolve_spec(binding.instantiate()?).map(Some),
            Target::Artifact(artifact) => {
                let candidates = self.candidates(artifact);
                if candidates.is_empty() {
                    if self.store.exists(artifact) {
                        debug!(artifact = %artifact, "target exists and no rule produces it");
                        return Ok(None);
                    }
                    return Err(ResolveError::MissingRule {
                        artifact: artifact.clone(),
                    });
                }

                let root = ChoiceFrame::new(artifact.clone(), candidates, Visited::new(), false);
                match self.run(Frame::Choice(root)) {
                    Ok(job) => Ok(Some(job)),
                    Err(error) if error.allows_existing() && self.store.exists(artifact) => {
                        warn!(
                            artifact = %artifact,
                            error = %error,
                            "producer of existing target cannot be resolved; using the artifact as is"
                        );
                        Ok(None)
                    }
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Resolve an instantiated job, reusing an already resolved job with the
    /// same key.
    pub(crate) fn resolve_spec(&mut self, spec: JobSpec) -> Outcome {
        if let Some(existing) = self.reusable(&spec.key()) {
            return Ok(existing);
        }
        let frame = self.open_job(spec, Visited::new(), false);
        self.run(Frame::Job(frame))
    }

    fn run(&mut self, root: Frame) -> Outcome {
        let mut current = root;
        let mut parents: Vec<Frame> = Vec::new();
        let mut incoming: Option<Outcome> = None;

        loop {
            let step = match &mut current {
                Frame::Choice(choice) => self.step_choice(choice, incoming.take()),
                Frame::Job(job) => self.step_job(job, incoming.take()),
            };
            match step {
                Step::Push(child) => parents.push(std::mem::replace(&mut current, child)),
                Step::Done(outcome) => match parents.pop() {
                    Some(parent) => {
                        current = parent;
                        incoming = Some(outcome);
                    }
                    None => return outcome,
                },
            }
        }
    }

    fn step_choice(&mut self, frame: &mut ChoiceFrame, incoming: Option<Outcome>) -> Step {
        if let (Some(outcome), Some(idx)) = (incoming, frame.pending.take()) {
            match outcome {
                Ok(job) => {
                    if let Some(done) = self.accept(frame, job, idx) {
                        return done;
                    }
                }
                Err(error) => {
                    trace!(artifact = %frame.artifact, error = %error, "candidate failed");
                    frame.errors.push(error);
                }
            }
        }

        while frame.next < frame.candidates.len() {
            let idx = frame.next;
            if let Some((_, best)) = frame.producer {
                let cmp = self
                    .catalog
                    .specificity(&frame.candidates[best], &frame.candidates[idx]);
                if cmp == Ordering::Greater {
                    break;
                }
            }
            frame.next += 1;

            let spec = match frame.candidates[idx].instantiate() {
                Ok(spec) => spec,
                Err(error) => {
                    frame.errors.push(error);
                    continue;
                }
            };
            let key = spec.key();

            if spec.inputs.contains(&frame.artifact) || frame.visited.contains(&key) {
                debug!(job = %key, artifact = %frame.artifact, "candidate would close a cycle");
                frame.cycles.push(key.to_string());
                continue;
            }

            if let Some(existing) = self.graph.lookup(&key) {
                if self.graph.is_resolved(existing) {
                    if let Some(done) = self.accept(frame, existing, idx) {
                        return done;
                    }
                } else {
                    // Unresolved jobs only exist on the current path.
                    frame.cycles.push(key.to_string());
                }
                continue;
            }

            frame.pending = Some(idx);
            let child = self.open_job(spec, frame.visited.clone(), frame.skip_until_dynamic);
            return Step::Push(Frame::Job(child));
        }

        if let Some((job, _)) = frame.producer {
            return Step::Done(Ok(job));
        }
        if let Some(job) = frame.cycles.first() {
            return Step::Done(Err(ResolveError::CyclicGraph {
                job: job.clone(),
                artifact: frame.artifact.clone(),
            }));
        }
        let error = match frame.errors.len() {
            0 => ResolveError::MissingRule {
                artifact: frame.artifact.clone(),
            },
            1 => frame.errors.remove(0),
            _ => ResolveError::Multiple(std::mem::take(&mut frame.errors)),
        };
        Step::Done(Err(error))
    }

    /// Record a successful candidate. Returns a final step when the choice is
    /// settled.
    fn accept(&mut self, frame: &mut ChoiceFrame, job: JobId, idx: usize) -> Option<Step> {
        if let Some((first, _)) = frame.producer {
            return Some(Step::Done(Err(ResolveError::AmbiguousRule {
                artifact: frame.artifact.clone(),
                first: self.describe(first),
                second: self.describe(job),
            })));
        }

        frame.producer = Some((job, idx));
        if self.ignore_ambiguity {
            return Some(Step::Done(Ok(job)));
        }
        None
    }

    fn step_job(&mut self, frame: &mut JobFrame, incoming: Option<Outcome>) -> Step {
        if let (Some(outcome), Some(artifact)) = (incoming, frame.pending.take()) {
            match outcome {
                Ok(producer) => frame.producers.push((artifact, producer)),
                Err(error) if frame.missing.contains(&artifact) || !error.allows_existing() => {
                    self.detach(frame.job);
                    return Step::Done(Err(error));
                }
                Err(error) => {
                    debug!(
                        job = %frame.name,
                        artifact = %artifact,
                        error = %error,
                        "producer cannot be resolved; using existing artifact"
                    );
                }
            }
        }

        while frame.next < frame.inputs.len() {
            let artifact = frame.inputs[frame.next].clone();
            frame.next += 1;

            let candidates = self.candidates(&artifact);
            if candidates.is_empty() {
                continue;
            }

            let skip = frame.skip_until_dynamic || artifact.is_dynamic();
            frame.pending = Some(artifact.clone());
            let child = ChoiceFrame::new(artifact, candidates, frame.visited.clone(), skip);
            return Step::Push(Frame::Choice(child));
        }

        let supplied: BTreeSet<&ArtifactRef> = frame.producers.iter().map(|(a, _)| a).collect();
        let missing: Vec<ArtifactRef> = frame
            .missing
            .iter()
            .filter(|a| !supplied.contains(a))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.detach(frame.job);
            return Step::Done(Err(ResolveError::MissingInput {
                job: frame.name.clone(),
                artifacts: missing,
            }));
        }

        for (artifact, producer) in &frame.producers {
            // Keep the producer's flags on the edge; temporariness belongs to it.
            let artifact = self
                .graph
                .job(*producer)
                .and_then(|p| p.outputs().iter().find(|o| *o == artifact))
                .cloned()
                .unwrap_or_else(|| artifact.clone());
            self.graph.add_edge(*producer, frame.job, artifact);
        }
        self.graph.mark_resolved(frame.job);
        if frame.skip_until_dynamic {
            self.state.dynamic.insert(frame.job);
        }

        debug!(job = %frame.name, id = %frame.job, deps = frame.producers.len(), "job resolved");
        Step::Done(Ok(frame.job))
    }

    fn open_job(&mut self, spec: JobSpec, mut visited: Visited, skip_until_dynamic: bool) -> JobFrame {
        let name = spec.to_string();
        let inputs = spec.inputs.clone();
        let dynamic_output = spec.outputs.iter().any(|o| o.is_dynamic());
        let missing = inputs
            .iter()
            .filter(|a| !self.store.exists(a))
            .cloned()
            .collect();

        visited.insert(spec.key());
        let job = self.graph.insert_job(spec);
        trace!(job = %name, id = %job, "resolving job");

        JobFrame {
            job,
            name,
            inputs,
            next: 0,
            pending: None,
            producers: Vec::new(),
            missing,
            visited,
            skip_until_dynamic: skip_until_dynamic && !dynamic_output,
        }
    }

    /// Candidates for `artifact`, most specific first. The sort is stable so
    /// declared order breaks ties.
    fn candidates(&self, artifact: &ArtifactRef) -> Vec<RuleBinding> {
        let mut candidates = self.catalog.candidates_for(artifact);
        candidates.sort_by(|a, b| self.catalog.specificity(b, a));
        candidates
    }

    fn reusable(&self, key: &JobKey) -> Option<JobId> {
        self.graph
            .lookup(key)
            .filter(|id| self.graph.is_resolved(*id))
    }

    /// Remove a job whose resolution failed. Its edges have not been attached
    /// yet, so no other job refers to it.
    fn detach(&mut self, job: JobId) {
        if let Some(removed) = self.graph.remove_job(job) {
            debug!(job = %removed.job, "detached job after failed resolution");
        }
        self.state.forget(job);
    }

    fn describe(&self, job: JobId) -> String {
        self.graph
            .job(job)
            .map(|j| j.to_string())
            .unwrap_or_else(|| job.to_string())
    }
}
