// tests/resolve_graph.rs

mod common;
use crate::common::{init_tracing, job_of, rules_of, scheduler, scheduler_with};

use jobdag::dag::{ArtifactRef, SchedulerOptions, Target};
use jobdag::errors::{JobdagError, ResolveError};
use jobdag::rules::{Catalog, Rule, RuleBinding, RuleCatalog, Wildcards};
use jobdag::store::MemoryArtifactStore;
use jobdag_test_utils::fixtures::clean_report_catalog;

fn single_failure(err: JobdagError) -> ResolveError {
    match err {
        JobdagError::UnresolvedTargets(mut failures) => {
            assert_eq!(failures.len(), 1, "unexpected failures: {failures:?}");
            failures.remove(0).error
        }
        other => panic!("expected UnresolvedTargets, got {other:?}"),
    }
}

fn two_producers_of_out() -> RuleCatalog {
    RuleCatalog::from_rules([
        Rule::builder("first").output("out.txt").build().unwrap(),
        Rule::builder("second").output("out.txt").build().unwrap(),
    ])
    .unwrap()
}

#[test]
fn missing_intermediate_propagates_in_both_directions() {
    init_tracing();
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");

    let mut s = scheduler(clean_report_catalog(false), &store);
    s.build(&[Target::from("report.txt")]).unwrap();

    let clean = job_of(&s, "clean");
    let report = job_of(&s, "report");
    assert!(s.is_needrun(clean));
    assert!(s.is_needrun(report));

    let clean_reason = s.reason(clean).unwrap();
    assert!(clean_reason.missing_output.contains(&ArtifactRef::new("clean.csv")));

    let report_reason = s.reason(report).unwrap();
    assert!(report_reason
        .updated_input_run
        .contains(&ArtifactRef::new("clean.csv")));

    assert_eq!(s.initial_frontier(), vec![clean]);

    store.add("clean.csv");
    let newly_ready = s.finish(clean, true).unwrap();
    assert_eq!(newly_ready, vec![report]);
}

#[test]
fn up_to_date_graph_needs_nothing() {
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    store.add("clean.csv");
    store.add("report.txt");

    let mut s = scheduler(clean_report_catalog(false), &store);
    s.build(&[Target::from("report.txt")]).unwrap();

    assert_eq!(s.needrun_jobs().count(), 0);
    assert!(s.initial_frontier().is_empty());
    assert!(s.is_done());
    for job in s.jobs() {
        assert!(s.reason(job.id()).unwrap().is_empty());
    }
}

#[test]
fn equally_specific_producers_are_ambiguous() {
    let store = MemoryArtifactStore::new();
    let mut s = scheduler(two_producers_of_out(), &store);

    let err = single_failure(s.build(&[Target::from("out.txt")]).unwrap_err());
    assert!(matches!(err, ResolveError::AmbiguousRule { .. }), "{err:?}");
}

#[test]
fn ignoring_ambiguity_picks_first_declared_rule() {
    let store = MemoryArtifactStore::new();
    let options = SchedulerOptions {
        ignore_ambiguity: true,
        ..SchedulerOptions::default()
    };
    let mut s = scheduler_with(two_producers_of_out(), &store, options);
    s.build(&[Target::from("out.txt")]).unwrap();

    assert_eq!(rules_of(s.jobs()), vec!["first"]);
}

#[test]
fn existing_ambiguous_target_is_still_ambiguous() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("first").input("a.in").output("out.txt").build().unwrap(),
        Rule::builder("second").input("b.in").output("out.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("a.in");
    store.add("b.in");
    store.add("out.txt");

    let mut s = scheduler(catalog, &store);
    let err = single_failure(s.build(&[Target::from("out.txt")]).unwrap_err());
    assert!(matches!(err, ResolveError::AmbiguousRule { .. }), "{err:?}");
}

#[test]
fn existing_ambiguous_input_fails_its_consumer() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("first").output("mid.txt").build().unwrap(),
        Rule::builder("second").output("mid.txt").build().unwrap(),
        Rule::builder("final").input("mid.txt").output("final.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("mid.txt");

    let mut s = scheduler(catalog, &store);
    let err = single_failure(s.build(&[Target::from("final.txt")]).unwrap_err());
    assert!(matches!(err, ResolveError::AmbiguousRule { .. }), "{err:?}");

    // The same graph resolves once ambiguity is accepted.
    let options = SchedulerOptions {
        ignore_ambiguity: true,
        ..SchedulerOptions::default()
    };
    let catalog = RuleCatalog::from_rules([
        Rule::builder("first").output("mid.txt").build().unwrap(),
        Rule::builder("second").output("mid.txt").build().unwrap(),
        Rule::builder("final").input("mid.txt").output("final.txt").build().unwrap(),
    ])
    .unwrap();
    let mut s = scheduler_with(catalog, &store, options);
    s.build(&[Target::from("final.txt")]).unwrap();
    assert_eq!(rules_of(s.jobs()), vec!["first", "final"]);
}

#[test]
fn more_specific_rule_wins_over_generic_one() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("generic")
            .input("{name}.in")
            .output("{name}.txt")
            .build()
            .unwrap(),
        Rule::builder("literal").output("out.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("out.in");

    let mut s = scheduler(catalog, &store);
    s.build(&[Target::from("out.txt")]).unwrap();
    assert_eq!(rules_of(s.jobs()), vec!["literal"]);
}

#[test]
fn mutual_dependency_is_a_cycle_and_leaves_no_jobs() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("a").input("b.txt").output("a.txt").build().unwrap(),
        Rule::builder("b").input("a.txt").output("b.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();

    let mut s = scheduler(catalog, &store);
    let err = single_failure(s.build(&[Target::from("a.txt")]).unwrap_err());
    assert!(matches!(err, ResolveError::CyclicGraph { .. }), "{err:?}");
    assert!(s.graph().is_empty());
}

#[test]
fn rule_consuming_its_own_output_is_a_cycle() {
    let catalog = RuleCatalog::from_rules([Rule::builder("loop")
        .input("x.txt")
        .output("x.txt")
        .build()
        .unwrap()])
    .unwrap();
    let store = MemoryArtifactStore::new();

    let mut s = scheduler(catalog, &store);
    let err = single_failure(s.build(&[Target::from("x.txt")]).unwrap_err());
    assert!(matches!(err, ResolveError::CyclicGraph { .. }), "{err:?}");
}

#[test]
fn missing_source_is_a_missing_input() {
    let store = MemoryArtifactStore::new();
    let mut s = scheduler(clean_report_catalog(false), &store);

    let err = single_failure(s.build(&[Target::from("report.txt")]).unwrap_err());
    match err {
        ResolveError::MissingInput { job, artifacts } => {
            assert!(job.starts_with("clean"), "{job}");
            assert_eq!(artifacts, vec![ArtifactRef::new("raw.csv")]);
        }
        other => panic!("expected MissingInput, got {other:?}"),
    }
    assert!(s.graph().is_empty());
}

#[test]
fn every_unreachable_target_is_reported() {
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    let mut s = scheduler(clean_report_catalog(false), &store);

    let err = s
        .build(&[
            Target::from("nope.txt"),
            Target::from("report.txt"),
            Target::from("also-nope.txt"),
        ])
        .unwrap_err();
    match err {
        JobdagError::UnresolvedTargets(failures) => {
            let targets: Vec<&str> = failures.iter().map(|f| f.target.as_str()).collect();
            assert_eq!(targets, vec!["nope.txt", "also-nope.txt"]);
            assert!(failures
                .iter()
                .all(|f| matches!(f.error, ResolveError::MissingRule { .. })));
        }
        other => panic!("expected UnresolvedTargets, got {other:?}"),
    }
}

#[test]
fn shared_producer_is_resolved_once() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("clean").input("raw.csv").output("clean.csv").build().unwrap(),
        Rule::builder("report").input("clean.csv").output("report.txt").build().unwrap(),
        Rule::builder("summary").input("clean.csv").output("summary.txt").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");

    let mut s = scheduler(catalog, &store);
    s.build(&[Target::from("report.txt"), Target::from("summary.txt")])
        .unwrap();

    let clean = job_of(&s, "clean");
    assert_eq!(s.graph().dependents_of(clean).len(), 2);
    assert_eq!(s.jobs().len(), 3);
    assert_eq!(s.jobs()[0].id(), clean);
}

#[test]
fn existing_input_with_unresolvable_producer_is_used_as_is() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("fetch").input("seed.txt").output("raw.csv").build().unwrap(),
        Rule::builder("clean").input("raw.csv").output("clean.csv").build().unwrap(),
    ])
    .unwrap();
    let store = MemoryArtifactStore::new();
    store.add("raw.csv");

    let mut s = scheduler(catalog, &store);
    s.build(&[Target::from("clean.csv")]).unwrap();
    assert_eq!(rules_of(s.jobs()), vec!["clean"]);
}

#[test]
fn existing_target_without_rule_needs_no_job() {
    let store = MemoryArtifactStore::new();
    store.add("notes.txt");
    let mut s = scheduler(RuleCatalog::new(), &store);

    s.build(&[Target::from("notes.txt")]).unwrap();
    assert!(s.graph().is_empty());
    assert!(s.is_done());
}

#[test]
fn job_target_without_outputs_always_runs() {
    let catalog = RuleCatalog::from_rules([
        Rule::builder("report").input("raw.csv").output("report.txt").build().unwrap(),
        Rule::builder("all").input("report.txt").build().unwrap(),
        Rule::builder("hello").build().unwrap(),
    ])
    .unwrap();
    let all = catalog.rule("all").unwrap();
    let hello = catalog.rule("hello").unwrap();

    let store = MemoryArtifactStore::new();
    store.add("raw.csv");
    store.add("report.txt");

    let mut s = scheduler(catalog, &store);
    s.build(&[
        Target::from(RuleBinding::new(all, Wildcards::new())),
        Target::from(RuleBinding::new(hello, Wildcards::new())),
    ])
    .unwrap();

    let all = job_of(&s, "all");
    let hello = job_of(&s, "hello");
    assert!(s.reason(all).unwrap().nooutput);
    assert!(s.reason(hello).unwrap().noio);
    assert!(!s.is_needrun(job_of(&s, "report")));

    let mut ready = s.initial_frontier();
    ready.sort();
    let mut expected = vec![all, hello];
    expected.sort();
    assert_eq!(ready, expected);
}
