#![allow(dead_code)]

use std::sync::Arc;

use jobdag::dag::{Scheduler, SchedulerOptions};
use jobdag::persistence::MemoryPersistence;
use jobdag::rules::RuleCatalog;
use jobdag::store::MemoryArtifactStore;

#[allow(unused_imports)]
pub use jobdag_test_utils::init_tracing;

/// Scheduler over an in-memory store with empty persistence.
pub fn scheduler(catalog: RuleCatalog, store: &MemoryArtifactStore) -> Scheduler {
    scheduler_with(catalog, store, SchedulerOptions::default())
}

pub fn scheduler_with(
    catalog: RuleCatalog,
    store: &MemoryArtifactStore,
    options: SchedulerOptions,
) -> Scheduler {
    Scheduler::new(
        catalog,
        Arc::new(store.clone()),
        MemoryPersistence::new(),
        options,
    )
}

/// Rule names of the given jobs, in order.
pub fn rules_of<'a>(jobs: impl IntoIterator<Item = &'a jobdag::dag::Job>) -> Vec<String> {
    jobs.into_iter().map(|j| j.rule_name().to_string()).collect()
}

/// Handle of the only job built from `rule`.
pub fn job_of(scheduler: &Scheduler, rule: &str) -> jobdag::dag::JobId {
    let ids: Vec<_> = scheduler
        .jobs()
        .into_iter()
        .filter(|j| j.rule_name() == rule)
        .map(|j| j.id())
        .collect();
    assert_eq!(ids.len(), 1, "expected exactly one job for rule {rule}");
    ids[0]
}
