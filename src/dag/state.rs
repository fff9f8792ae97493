// src/dag/state.rs

//! Graph-wide state sets.

use std::collections::{BTreeMap, BTreeSet};

use crate::dag::job::JobId;
use crate::dag::reason::Reason;

/// Per-engine membership sets.
///
/// `ready` is always a subset of `needrun \ finished`. A job is in `needrun`
/// exactly when its entry in `reasons` is non-empty.
#[derive(Debug, Default, Clone)]
pub struct RunState {
    pub needrun: BTreeSet<JobId>,
    pub finished: BTreeSet<JobId>,
    pub ready: BTreeSet<JobId>,
    /// Jobs sitting between a dynamic consumer and its dynamic producer.
    /// They wait for a rewrite and are never ready.
    pub dynamic: BTreeSet<JobId>,
    pub reasons: BTreeMap<JobId, Reason>,
    /// Jobs exempt from forcing, e.g. rewritten replacements.
    pub omit_force: BTreeSet<JobId>,
}

impl RunState {
    pub fn is_needrun(&self, job: JobId) -> bool {
        self.needrun.contains(&job)
    }

    pub fn is_finished(&self, job: JobId) -> bool {
        self.finished.contains(&job)
    }

    /// Need-run and not yet finished.
    pub fn is_pending(&self, job: JobId) -> bool {
        self.is_needrun(job) && !self.is_finished(job)
    }

    pub fn reason(&self, job: JobId) -> Option<&Reason> {
        self.reasons.get(&job)
    }

    /// Drop every trace of a deleted job.
    pub fn forget(&mut self, job: JobId) {
        self.needrun.remove(&job);
        self.finished.remove(&job);
        self.ready.remove(&job);
        self.dynamic.remove(&job);
        self.reasons.remove(&job);
        self.omit_force.remove(&job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_jobs_are_not_pending() {
        let job = JobId(3);
        let mut state = RunState::default();
        state.needrun.insert(job);
        assert!(state.is_pending(job));

        state.finished.insert(job);
        assert!(!state.is_pending(job));
    }

    #[test]
    fn forget_clears_every_set() {
        let job = JobId(7);
        let mut state = RunState::default();
        state.needrun.insert(job);
        state.ready.insert(job);
        state.dynamic.insert(job);
        state.omit_force.insert(job);
        state.reasons.insert(
            job,
            Reason {
                forced: true,
                ..Reason::default()
            },
        );

        state.forget(job);
        assert!(!state.is_needrun(job));
        assert!(state.ready.is_empty() && state.dynamic.is_empty() && state.omit_force.is_empty());
        assert!(state.reason(job).is_none());
    }
}
