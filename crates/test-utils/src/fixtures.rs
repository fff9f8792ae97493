//! Rule catalogs shared by the integration tests.

use jobdag::rules::{Rule, RuleCatalog};

/// `raw.csv -> clean -> clean.csv -> report -> report.txt`.
///
/// With `temp_clean`, `clean.csv` is a temporary artifact.
pub fn clean_report_catalog(temp_clean: bool) -> RuleCatalog {
    let clean = Rule::builder("clean").input("raw.csv");
    let clean = if temp_clean {
        clean.temp_output("clean.csv")
    } else {
        clean.output("clean.csv")
    };
    RuleCatalog::from_rules([
        clean.build().expect("clean rule"),
        Rule::builder("report")
            .input("clean.csv")
            .output("report.txt")
            .build()
            .expect("report rule"),
    ])
    .expect("clean/report catalog")
}

/// `data.txt -> split -> chunk_{i}.txt (dynamic) -> merge -> merged.txt`.
pub fn split_merge_catalog() -> RuleCatalog {
    RuleCatalog::from_rules([
        Rule::builder("split")
            .input("data.txt")
            .dynamic_output("chunk_{i}.txt")
            .build()
            .expect("split rule"),
        Rule::builder("merge")
            .dynamic_input("chunk_{i}.txt")
            .output("merged.txt")
            .build()
            .expect("merge rule"),
    ])
    .expect("split/merge catalog")
}

/// A linear chain `step0 -> step1 -> ... -> step{n-1}` where `step{k}`
/// reads `a{k}.txt` and writes `a{k+1}.txt`. `a0.txt` is the source.
pub fn chain_catalog(n: usize) -> RuleCatalog {
    RuleCatalog::from_rules((0..n).map(|k| {
        Rule::builder(format!("step{k}"))
            .input(format!("a{k}.txt"))
            .output(format!("a{}.txt", k + 1))
            .build()
            .expect("chain rule")
    }))
    .expect("chain catalog")
}
