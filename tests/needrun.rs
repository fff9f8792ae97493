// tests/needrun.rs

mod common;
use crate::common::{init_tracing, job_of, scheduler, scheduler_with};

use std::collections::BTreeSet;
use std::sync::Arc;

use jobdag::dag::{ArtifactRef, HIGHEST_PRIORITY, JobMatcher, Scheduler, SchedulerOptions, Target};
use jobdag::errors::JobdagError;
use jobdag::persistence::{ArtifactRecord, MemoryPersistence};
use jobdag::rules::{Rule, RuleCatalog};
use jobdag::store::MemoryArtifactStore;
use jobdag_test_utils::fixtures::{chain_catalog, clean_report_catalog};

/// `a0.txt` .. `a{n}.txt` all present, in order.
fn built_chain(store: &MemoryArtifactStore, n: usize) {
    for k in 0..=n {
        store.add(format!("a{k}.txt"));
    }
}

#[test]
fn newer_source_makes_the_whole_chain_stale() {
    init_tracing();
    let store = MemoryArtifactStore::new();
    built_chain(&store, 3);
    store.touch("a0.txt").unwrap();

    let mut s = scheduler(chain_catalog(3), &store);
    s.build(&[Target::from("a3.txt")]).unwrap();

    let step0 = job_of(&s, "step0");
    let step1 = job_of(&s, "step1");
    let step2 = job_of(&s, "step2");

    let reason0 = s.reason(step0).unwrap();
    assert!(reason0.updated_input.contains(&ArtifactRef::new("a0.txt")));
    assert!(!reason0.derived);

    // Downstream jobs see the new source through their ancestors.
    assert!(s.reason(step2).unwrap().updated_input.contains(&ArtifactRef::new("a2.txt")));
    assert!(s.reason(step1).unwrap().updated_input_run.contains(&ArtifactRef::new("a1.txt")));
    assert_eq!(s.initial_frontier(), vec![step0]);
}

#[test]
fn stale_middle_only_reruns_downstream() {
    let store = MemoryArtifactStore::new();
    built_chain(&store, 3);
    store.touch("a1.txt").unwrap();

    let mut s = scheduler(chain_catalog(3), &store);
    s.build(&[Target::from("a3.txt")]).unwrap();

    assert!(!s.is_needrun(job_of(&s, "step0")));
    assert!(s.is_needrun(job_of(&s, "step1")));
    assert!(s.is_needrun(job_of(&s, "step2")));
}

#[test]
fn derived_marks_jobs_without_own_reason() {
    let store = MemoryArtifactStore::new();
    built_chain(&store, 2);
    let options = SchedulerOptions {
        force: JobMatcher::rules(["step0"]),
        ..SchedulerOptions::default()
    };

    let mut s = scheduler_with(chain_catalog(2), &store, options);
    s.build(&[Target::from("a2.txt")]).unwrap();

    let step0 = s.reason(job_of(&s, "step0")).unwrap();
    assert!(step0.forced);
    assert!(!step0.derived);

    let step1 = s.reason(job_of(&s, "step1")).unwrap();
    assert!(step1.derived);
    assert!(!step1.forced);
    assert!(step1.updated_input_run.contains(&ArtifactRef::new("a1.txt")));
}

#[test]
fn forcing_an_artifact_forces_its_producer() {
    let store = MemoryArtifactStore::new();
    built_chain(&store, 2);
    let options = SchedulerOptions {
        force: JobMatcher::new(Vec::<String>::new(), ["a2.*"]).unwrap(),
        ..SchedulerOptions::default()
    };

    let mut s = scheduler_with(chain_catalog(2), &store, options);
    s.build(&[Target::from("a2.txt")]).unwrap();

    assert!(!s.is_needrun(job_of(&s, "step0")));
    assert!(s.reason(job_of(&s, "step1")).unwrap().forced);
}

#[test]
fn needrun_matches_non_empty_reason() {
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    store.add("clean.csv");

    let mut s = scheduler(clean_report_catalog(false), &store);
    s.build(&[Target::from("report.txt")]).unwrap();

    for job in s.jobs() {
        let reason = s.reason(job.id()).unwrap();
        assert_eq!(s.is_needrun(job.id()), !reason.is_empty(), "{job}: {reason}");
    }
}

#[test]
fn recompute_is_idempotent() {
    let store = MemoryArtifactStore::new();
    built_chain(&store, 4);
    store.touch("a2.txt").unwrap();

    let mut s = scheduler(chain_catalog(4), &store);
    s.build(&[Target::from("a4.txt")]).unwrap();

    let snapshot = |s: &Scheduler| {
        s.jobs()
            .into_iter()
            .map(|j| (j.id(), s.is_needrun(j.id()), s.reason(j.id()).cloned()))
            .collect::<Vec<_>>()
    };
    let before = snapshot(&s);
    s.recompute();
    assert_eq!(snapshot(&s), before);
}

#[test]
fn resolving_twice_over_the_same_store_agrees() {
    let store = MemoryArtifactStore::new();
    built_chain(&store, 4);
    store.touch("a2.txt").unwrap();

    let snapshot = |s: &Scheduler| {
        s.jobs()
            .into_iter()
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

    let mut first = scheduler(chain_catalog(4), &store);
    first.build(&[Target::from("a4.txt")]).unwrap();
    let mut second = scheduler(chain_catalog(4), &store);
    second.build(&[Target::from("a4.txt")]).unwrap();

    assert_eq!(snapshot(&first), snapshot(&second));
}

#[test]
fn missing_secondary_output_needs_a_run() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("clean")
            .input("raw.csv")
            .output("clean.csv")
            .output("clean.log")
            .build()
            .unwrap(),
        Rule::builder("report").input("clean.csv").output("report.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    store.add("clean.csv");
    store.add("report.txt");

    let mut s = scheduler(catalog, &store);
    s.build(&[Target::from("report.txt")]).unwrap();

    let clean = job_of(&s, "clean");
    assert!(s.is_needrun(clean));
    assert!(s.reason(clean).unwrap().missing_output.contains(&ArtifactRef::new("clean.log")));
    // The rerun of clean rewrites clean.csv, so report follows.
    let report = job_of(&s, "report");
    assert!(s.is_needrun(report));
    assert!(s.reason(report).unwrap().updated_input_run.contains(&ArtifactRef::new("clean.csv")));
}

#[test]
fn priority_rules_elevate_upstream_jobs() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("clean").input("raw.csv").output("clean.csv").build().unwrap(),
        Rule::builder("report").input("clean.csv").output("report.txt").build().unwrap(),
        Rule::builder("other").input("raw.csv").output("other.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    let options = SchedulerOptions {
        priority: JobMatcher::rules(["report"]),
        ..SchedulerOptions::default()
    };

    let mut s = scheduler_with(catalog, &store, options);
    s.build(&[Target::from("other.txt"), Target::from("report.txt")])
        .unwrap();

    let clean = job_of(&s, "clean");
    let other = job_of(&s, "other");
    assert_eq!(s.job(clean).unwrap().priority(), HIGHEST_PRIORITY);
    assert_eq!(s.job(job_of(&s, "report")).unwrap().priority(), HIGHEST_PRIORITY);
    assert_eq!(s.job(other).unwrap().priority(), 0);
    assert_eq!(s.initial_frontier(), vec![clean, other]);
}

fn incomplete_record() -> ArtifactRecord {
    ArtifactRecord {
        rule: "clean".to_string(),
        version: None,
        code: None,
        incomplete: true,
    }
}

fn up_to_date_store() -> MemoryArtifactStore {
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    store.add("clean.csv");
    store.add("report.txt");
    store
}

#[test]
fn incomplete_artifacts_fail_the_build() {
    let store = up_to_date_store();
    let mut persistence = MemoryPersistence::new();
    persistence.insert("clean.csv", incomplete_record());

    let mut s = Scheduler::new(
        clean_report_catalog(false),
        Arc::new(store),
        persistence,
        SchedulerOptions::default(),
    );
    let err = s.build(&[Target::from("report.txt")]).unwrap_err();
    match err {
        JobdagError::IncompleteRun { artifacts } => {
            assert_eq!(artifacts, vec![ArtifactRef::new("clean.csv")]);
        }
        other => panic!("expected IncompleteRun, got {other:?}"),
    }
}

#[test]
fn incomplete_artifacts_can_be_forced() {
    let store = up_to_date_store();
    let mut persistence = MemoryPersistence::new();
    persistence.insert("clean.csv", incomplete_record());
    let options = SchedulerOptions {
        force_incomplete: true,
        ..SchedulerOptions::default()
    };

    let mut s = Scheduler::new(clean_report_catalog(false), Arc::new(store), persistence, options);
    s.build(&[Target::from("report.txt")]).unwrap();

    let clean = job_of(&s, "clean");
    assert!(s.reason(clean).unwrap().forced);
    assert!(s.is_needrun(job_of(&s, "report")));
}

#[test]
fn code_drift_is_reported_and_optionally_reruns() {
    let catalog = || {
        RuleCatalog::from_rules([Rule::builder("clean")
            .input("raw.csv")
            .output("clean.csv")
            .code("sort -u raw.csv")
            .build()
            .unwrap()])
        .unwrap()
    };
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    store.add("clean.csv");

    let persistence = || {
        let mut persistence = MemoryPersistence::new();
        persistence.insert(
            "clean.csv",
            ArtifactRecord {
                rule: "clean".to_string(),
                version: None,
                code: Some("stale fingerprint".to_string()),
                incomplete: false,
            },
        );
        persistence
    };

    let mut quiet = Scheduler::new(
        catalog(),
        Arc::new(store.clone()),
        persistence(),
        SchedulerOptions::default(),
    );
    quiet.build(&[Target::from("clean.csv")]).unwrap();
    assert!(quiet.is_done());
    assert_eq!(quiet.code_changes(), vec![ArtifactRef::new("clean.csv")]);
    assert!(quiet.version_changes().is_empty());

    let options = SchedulerOptions {
        rerun_on_code_change: true,
        ..SchedulerOptions::default()
    };
    let mut strict = Scheduler::new(catalog(), Arc::new(store), persistence(), options);
    strict.build(&[Target::from("clean.csv")]).unwrap();
    let reason = strict.reason(job_of(&strict, "clean")).unwrap();
    let changed: BTreeSet<ArtifactRef> = [ArtifactRef::new("clean.csv")].into();
    assert_eq!(reason.code_changed, changed);
}
