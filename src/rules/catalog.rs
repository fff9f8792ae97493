// src/rules/catalog.rs

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::{ArtifactRef, JobSpec};
use crate::errors::{JobdagError, ResolveError, Result};
use crate::rules::pattern::Wildcards;
use crate::rules::rule::{Producer, Rule, Specificity};

/// A rule together with the bindings that make it produce one artifact.
#[derive(Debug, Clone)]
pub struct RuleBinding {
    pub rule: Arc<Rule>,
    pub wildcards: Wildcards,
}

impl RuleBinding {
    pub fn new(rule: Arc<Rule>, wildcards: Wildcards) -> Self {
        Self { rule, wildcards }
    }

    pub fn instantiate(&self) -> std::result::Result<JobSpec, ResolveError> {
        self.rule.instantiate(&self.wildcards)
    }
}

/// Source of candidate producers, owned by one scheduler instance.
pub trait Catalog: Send + Sync {
    /// Every rule able to produce `artifact`, in declared order.
    fn candidates_for(&self, artifact: &ArtifactRef) -> Vec<RuleBinding>;

    /// `Greater` when `a` is more specific than `b`.
    fn specificity(&self, a: &RuleBinding, b: &RuleBinding) -> Ordering {
        a.rule.cmp_specificity(&b.rule)
    }

    fn rule(&self, name: &str) -> Option<Arc<Rule>>;

    /// Replace the rule called `name` with a concrete variant derived after
    /// a dynamic job ran. Later resolutions see the new rule.
    fn specialize(&mut self, name: &str, rule: Rule) -> Arc<Rule>;
}

/// Rules kept in declared order.
#[derive(Debug, Default, Clone)]
pub struct RuleCatalog {
    rules: Vec<Arc<Rule>>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Result<Self> {
        let mut catalog = Self::new();
        for rule in rules {
            catalog.add(rule)?;
        }
        Ok(catalog)
    }

    pub fn add(&mut self, rule: Rule) -> Result<Arc<Rule>> {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return Err(JobdagError::ConfigError(format!(
                "rule '{}' is declared twice",
                rule.name()
            )));
        }
        let rule = Arc::new(rule);
        self.rules.push(Arc::clone(&rule));
        Ok(rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }
}

impl Catalog for RuleCatalog {
    fn candidates_for(&self, artifact: &ArtifactRef) -> Vec<RuleBinding> {
        let candidates: Vec<RuleBinding> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.produces(artifact)
                    .map(|wildcards| RuleBinding::new(Arc::clone(rule), wildcards))
            })
            .collect();
        debug!(
            artifact = %artifact,
            candidates = candidates.len(),
            "looked up candidate rules"
        );
        candidates
    }

    fn rule(&self, name: &str) -> Option<Arc<Rule>> {
        self.rules.iter().find(|r| r.name() == name).cloned()
    }

    fn specialize(&mut self, name: &str, rule: Rule) -> Arc<Rule> {
        let rule = Arc::new(rule);
        match self.rules.iter_mut().find(|r| r.name() == name) {
            Some(slot) => *slot = Arc::clone(&rule),
            None => self.rules.push(Arc::clone(&rule)),
        }
        info!(rule = %name, "specialised rule after dynamic output was realized");
        rule
    }
}
