// tests/property_scheduler.rs

mod common;
use crate::common::scheduler;

use proptest::prelude::*;

use jobdag::dag::{Scheduler, Target};
use jobdag::store::MemoryArtifactStore;
use jobdag_test_utils::fixtures::chain_catalog;

/// A chain of `n` steps plus, for every intermediate artifact `a1..an`,
/// its modification time or `None` when it does not exist.
fn chain_state() -> impl Strategy<Value = (usize, u64, Vec<Option<u64>>)> {
    (1usize..7).prop_flat_map(|n| {
        (
            Just(n),
            1u64..100,
            proptest::collection::vec(proptest::option::of(1u64..100), n),
        )
    })
}

fn build(n: usize, source: u64, artifacts: &[Option<u64>]) -> (MemoryArtifactStore, Scheduler) {
    let store = MemoryArtifactStore::new();
    store.add_at("a0.txt", source);
    for (k, modified) in artifacts.iter().enumerate() {
        if let Some(modified) = modified {
            store.add_at(format!("a{}.txt", k + 1), *modified);
        }
    }
    let mut s = scheduler(chain_catalog(n), &store);
    s.build(&[Target::from(format!("a{n}.txt").as_str())])
        .expect("chain with a source always resolves");
    (store, s)
}

proptest! {
    #[test]
    fn needrun_is_exactly_non_empty_reason((n, source, artifacts) in chain_state()) {
        let (_store, s) = build(n, source, &artifacts);
        prop_assert_eq!(s.jobs().len(), n);
        for job in s.jobs() {
            let reason = s.reason(job.id()).expect("every job has a reason");
            prop_assert_eq!(s.is_needrun(job.id()), !reason.is_empty());
        }
    }

    #[test]
    fn needrun_jobs_form_a_downstream_closed_suffix((n, source, artifacts) in chain_state()) {
        let (_store, s) = build(n, source, &artifacts);
        let flags: Vec<bool> = s.jobs().iter().map(|j| s.is_needrun(j.id())).collect();
        if let Some(first) = flags.iter().position(|f| *f) {
            prop_assert!(flags[first..].iter().all(|f| *f), "{:?}", flags);
        }
        // A missing final artifact always needs a run.
        if artifacts[n - 1].is_none() {
            prop_assert!(flags[n - 1]);
        }
    }

    #[test]
    fn recompute_is_idempotent((n, source, artifacts) in chain_state()) {
        let (_store, mut s) = build(n, source, &artifacts);
        let before: Vec<_> = s
            .jobs()
            .iter()
            .map(|j| (s.is_needrun(j.id()), s.reason(j.id()).cloned()))
            .collect();
        s.recompute();
        let after: Vec<_> = s
            .jobs()
            .iter()
            .map(|j| (s.is_needrun(j.id()), s.reason(j.id()).cloned()))
            .collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn resolving_the_same_store_twice_agrees((n, source, artifacts) in chain_state()) {
        let (store, first) = build(n, source, &artifacts);
        let mut second = scheduler(chain_catalog(n), &store);
        second
            .build(&[Target::from(format!("a{n}.txt").as_str())])
            .expect("chain with a source always resolves");

        let snapshot = |s: &Scheduler| {
            s.jobs()
                .iter()
                .map(|j| {
                    (
                        j.rule_name().to_string(),
                        j.wildcards().clone(),
                        s.is_needrun(j.id()),
                        s.reason(j.id()).cloned(),
                    )
                })
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(snapshot(&first), snapshot(&second));
    }

    #[test]
    fn finishing_ready_jobs_drains_the_graph((n, source, artifacts) in chain_state()) {
        let (store, mut s) = build(n, source, &artifacts);
        let needrun = s.needrun_jobs().count();

        let mut ready = s.initial_frontier();
        prop_assert!(ready.len() <= 1);
        let mut finished = 0;
        while let Some(job) = ready.pop() {
            for dependency in s.graph().dependencies_of(job).keys() {
                prop_assert!(!s.is_needrun(*dependency) || s.is_finished(*dependency));
            }
            let outputs: Vec<String> = s
                .job(job)
                .expect("ready job exists")
                .outputs()
                .iter()
                .map(|o| o.path().to_string())
                .collect();
            for output in outputs {
                store.add(output);
            }
            ready.extend(s.finish(job, true).expect("finish ready job"));
            finished += 1;
            prop_assert!(finished <= needrun);
        }

        prop_assert_eq!(finished, needrun);
        prop_assert!(s.is_done());
    }
}
