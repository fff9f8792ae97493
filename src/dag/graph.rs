// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::dag::artifact::ArtifactRef;
use crate::dag::job::{Job, JobId, JobKey, JobSpec};

/// Neighbour job → artifacts flowing along that edge.
pub type Edges = BTreeMap<JobId, BTreeSet<ArtifactRef>>;

static NO_EDGES: Edges = BTreeMap::new();

/// Which adjacency relation a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards producers of a job's inputs.
    Dependencies,
    /// Towards consumers of a job's outputs.
    Dependents,
}

/// A job together with the edges it had when it was removed.
#[derive(Debug)]
pub struct RemovedJob {
    pub job: Job,
    pub dependencies: Edges,
    pub dependents: Edges,
}

/// Arena of jobs with mirrored dependency/dependent adjacency.
///
/// Edges only ever store [`JobId`] handles. Every mutation updates both
/// adjacency maps together, so `dependencies[a][b]` exists exactly when
/// `dependents[b][a]` does, with the same artifact set.
#[derive(Debug, Default)]
pub struct JobGraph {
    jobs: BTreeMap<JobId, Job>,
    /// consumer → producer → artifacts
    dependencies: BTreeMap<JobId, Edges>,
    /// producer → consumer → artifacts
    dependents: BTreeMap<JobId, Edges>,
    index: HashMap<JobKey, JobId>,
    /// Jobs whose inputs have all been attached.
    resolved: BTreeSet<JobId>,
    targets: BTreeSet<JobId>,
    next_id: u32,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a new job in the arena. The job starts unresolved and without
    /// edges. Its key now refers to the new handle.
    pub fn insert_job(&mut self, spec: JobSpec) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;

        self.index.insert(spec.key(), id);
        self.jobs.insert(id, Job::from_spec(id, spec));
        self.dependencies.insert(id, Edges::new());
        self.dependents.insert(id, Edges::new());
        id
    }

    /// Record that `consumer` reads `artifact` produced by `producer`.
    pub fn add_edge(&mut self, producer: JobId, consumer: JobId, artifact: ArtifactRef) {
        self.dependencies
            .entry(consumer)
            .or_default()
            .entry(producer)
            .or_default()
            .insert(artifact.clone());
        self.dependents
            .entry(producer)
            .or_default()
            .entry(consumer)
            .or_default()
            .insert(artifact);
    }

    /// Remove a job and every edge touching it.
    pub fn remove_job(&mut self, id: JobId) -> Option<RemovedJob> {
        let job = self.jobs.remove(&id)?;

        let dependencies = self.dependencies.remove(&id).unwrap_or_default();
        for producer in dependencies.keys() {
            if let Some(edges) = self.dependents.get_mut(producer) {
                edges.remove(&id);
            }
        }

        let dependents = self.dependents.remove(&id).unwrap_or_default();
        for consumer in dependents.keys() {
            if let Some(edges) = self.dependencies.get_mut(consumer) {
                edges.remove(&id);
            }
        }

        let key = job.key();
        if self.index.get(&key) == Some(&id) {
            self.index.remove(&key);
        }
        self.resolved.remove(&id);
        self.targets.remove(&id);

        Some(RemovedJob {
            job,
            dependencies,
            dependents,
        })
    }

    pub fn mark_resolved(&mut self, id: JobId) {
        if self.jobs.contains_key(&id) {
            self.resolved.insert(id);
        }
    }

    pub fn is_resolved(&self, id: JobId) -> bool {
        self.resolved.contains(&id)
    }

    pub fn add_target(&mut self, id: JobId) {
        if self.jobs.contains_key(&id) {
            self.targets.insert(id);
        }
    }

    pub fn is_target(&self, id: JobId) -> bool {
        self.targets.contains(&id)
    }

    pub fn targets(&self) -> &BTreeSet<JobId> {
        &self.targets
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub(crate) fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn lookup(&self, key: &JobKey) -> Option<JobId> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// All job handles in creation order.
    pub fn ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.jobs.keys().copied()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Direct producers of this job's inputs.
    pub fn dependencies_of(&self, id: JobId) -> &Edges {
        self.dependencies.get(&id).unwrap_or(&NO_EDGES)
    }

    /// Direct consumers of this job's outputs.
    pub fn dependents_of(&self, id: JobId) -> &Edges {
        self.dependents.get(&id).unwrap_or(&NO_EDGES)
    }

    pub fn neighbours(&self, id: JobId, direction: Direction) -> &Edges {
        match direction {
            Direction::Dependencies => self.dependencies_of(id),
            Direction::Dependents => self.dependents_of(id),
        }
    }

    /// Breadth-first traversal from `starts`.
    ///
    /// Jobs for which `stop` returns true are neither yielded nor expanded.
    /// Start jobs are yielded first, in the given order.
    pub fn bfs<I, F>(&self, direction: Direction, starts: I, mut stop: F) -> Vec<JobId>
    where
        I: IntoIterator<Item = JobId>,
        F: FnMut(JobId) -> bool,
    {
        let mut queue: VecDeque<JobId> = VecDeque::new();
        let mut visited: BTreeSet<JobId> = BTreeSet::new();
        for id in starts {
            if self.contains(id) && visited.insert(id) {
                queue.push_back(id);
            }
        }

        let mut order = Vec::new();
        while let Some(id) = queue.pop_front() {
            if stop(id) {
                continue;
            }
            order.push(id);
            for next in self.neighbours(id, direction).keys() {
                if visited.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        order
    }

    /// Every job a target job transitively depends on, targets included.
    pub fn reachable_from_targets(&self) -> BTreeSet<JobId> {
        self.bfs(
            Direction::Dependencies,
            self.targets.iter().copied(),
            |_| false,
        )
        .into_iter()
        .collect()
    }

    /// Jobs ordered so that every producer precedes its consumers.
    pub fn topological_order(&self) -> Vec<JobId> {
        let mut graph: DiGraphMap<JobId, ()> = DiGraphMap::new();
        for id in self.jobs.keys() {
            graph.add_node(*id);
        }
        for (consumer, producers) in &self.dependencies {
            for producer in producers.keys() {
                graph.add_edge(*producer, *consumer, ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                warn!(job = %cycle.node_id(), "job graph contains a cycle; falling back to creation order");
                self.jobs.keys().copied().collect()
            }
        }
    }
}
