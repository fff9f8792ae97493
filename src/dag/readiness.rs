// src/dag/readiness.rs

//! The executable frontier.
//!
//! A job is ready when it needs to run, has not finished, is not waiting for
//! a dynamic rewrite, and each of its dependencies has either finished or does
//! not need to run at all.

use tracing::trace;

use crate::dag::graph::JobGraph;
use crate::dag::job::JobId;
use crate::dag::state::RunState;

pub(crate) fn is_ready_candidate(graph: &JobGraph, state: &RunState, id: JobId) -> bool {
    graph.contains(id)
        && state.is_pending(id)
        && !state.dynamic.contains(&id)
        && graph
            .dependencies_of(id)
            .keys()
            .all(|dep| !state.is_needrun(*dep) || state.is_finished(*dep))
}

/// Recompute the whole frontier from scratch.
pub(crate) fn update_ready(graph: &JobGraph, state: &mut RunState) {
    let ready = graph
        .ids()
        .filter(|id| is_ready_candidate(graph, state, *id))
        .collect();
    state.ready = ready;
}

/// Move `id` out of the frontier and admit whichever direct dependents just
/// became ready.
pub(crate) fn mark_finished(graph: &JobGraph, state: &mut RunState, id: JobId) {
    state.finished.insert(id);
    state.ready.remove(&id);

    for dependent in graph.dependents_of(id).keys() {
        if is_ready_candidate(graph, state, *dependent) && state.ready.insert(*dependent) {
            trace!(job = %dependent, after = %id, "dependent became ready");
        }
    }
}
