// src/dag/priority.rs

use std::collections::BTreeSet;

use tracing::debug;

use crate::dag::graph::{Direction, JobGraph};
use crate::dag::job::{HIGHEST_PRIORITY, JobId};
use crate::dag::matcher::JobMatcher;
use crate::dag::state::RunState;

/// Raise every pending job matching `matcher`, and every pending job it
/// transitively depends on, to [`HIGHEST_PRIORITY`].
///
/// The walk stops at jobs that are finished or do not need to run. Priorities
/// never decrease, so calling this again is harmless.
pub(crate) fn elevate(graph: &mut JobGraph, state: &RunState, matcher: &JobMatcher) -> usize {
    if matcher.is_empty() {
        return 0;
    }

    let roots: Vec<JobId> = graph
        .jobs()
        .filter(|job| state.is_pending(job.id()) && matcher.matches(job))
        .map(|job| job.id())
        .collect();
    if roots.is_empty() {
        return 0;
    }

    let elevated: BTreeSet<JobId> = graph
        .bfs(Direction::Dependencies, roots, |id| !state.is_pending(id))
        .into_iter()
        .collect();

    for id in &elevated {
        if let Some(job) = graph.job_mut(*id) {
            if job.priority() < HIGHEST_PRIORITY {
                debug!(job = %job, "elevated priority");
                job.set_priority(HIGHEST_PRIORITY);
            }
        }
    }
    elevated.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::artifact::ArtifactRef;
    use crate::rules::Rule;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn spec(name: &str, input: Option<&str>, output: &str) -> crate::dag::JobSpec {
        let mut builder = Rule::builder(name).output(output).priority(1);
        if let Some(input) = input {
            builder = builder.input(input);
        }
        let rule = Arc::new(builder.build().unwrap());
        rule.instantiate(&BTreeMap::new()).unwrap()
    }

    #[test]
    fn elevates_matching_job_and_pending_upstream() {
        let mut graph = JobGraph::new();
        let a = graph.insert_job(spec("a", None, "a.txt"));
        let b = graph.insert_job(spec("b", Some("a.txt"), "b.txt"));
        let c = graph.insert_job(spec("c", Some("b.txt"), "c.txt"));
        graph.add_edge(a, b, ArtifactRef::new("a.txt"));
        graph.add_edge(b, c, ArtifactRef::new("b.txt"));

        let mut state = RunState::default();
        state.needrun.extend([a, b, c]);
        state.finished.insert(a);

        let matcher = JobMatcher::rules(["c"]);
        assert_eq!(elevate(&mut graph, &state, &matcher), 2);

        assert_eq!(graph.job(c).unwrap().priority(), HIGHEST_PRIORITY);
        assert_eq!(graph.job(b).unwrap().priority(), HIGHEST_PRIORITY);
        assert_eq!(graph.job(a).unwrap().priority(), 1);
    }

    #[test]
    fn empty_matcher_is_a_no_op() {
        let mut graph = JobGraph::new();
        let a = graph.insert_job(spec("a", None, "a.txt"));
        let mut state = RunState::default();
        state.needrun.insert(a);

        assert_eq!(elevate(&mut graph, &state, &JobMatcher::default()), 0);
        assert_eq!(graph.job(a).unwrap().priority(), 1);
    }
}
