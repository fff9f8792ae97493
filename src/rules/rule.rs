// src/rules/rule.rs

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use blake3::Hasher;

use crate::dag::{ArtifactFlags, ArtifactRef, JobSpec};
use crate::errors::{JobdagError, ResolveError, Result};
use crate::rules::pattern::{Pattern, Wildcards};

/// Can this thing produce a given artifact, and with which bindings?
pub trait Producer {
    fn produces(&self, artifact: &ArtifactRef) -> Option<Wildcards>;
}

/// Ordering used to break ties between candidate producers.
///
/// A higher explicit rank wins; at equal rank the candidate with fewer
/// output wildcards is the more specific one.
pub trait Specificity {
    fn rank(&self) -> i32;
    fn wildcard_count(&self) -> usize;

    fn cmp_specificity(&self, other: &Self) -> Ordering
    where
        Self: Sized,
    {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| other.wildcard_count().cmp(&self.wildcard_count()))
    }
}

/// Which side of a rule a dynamic branch rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicSide {
    Output,
    Input,
}

/// A declared input or output: a template plus lifecycle flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pattern: Pattern,
    flags: ArtifactFlags,
}

impl PatternSpec {
    pub fn new(pattern: Pattern, flags: ArtifactFlags) -> Self {
        Self { pattern, flags }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn flags(&self) -> ArtifactFlags {
        self.flags
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.dynamic
    }

    /// Dynamic specs keep their unbound wildcards as placeholders.
    fn instantiate(&self, wildcards: &Wildcards) -> std::result::Result<ArtifactRef, String> {
        let path = if self.flags.dynamic {
            self.pattern.partial_expand(wildcards)
        } else {
            self.pattern.expand(wildcards)?
        };
        Ok(ArtifactRef::with_flags(path, self.flags))
    }
}

/// A template for jobs: how a family of outputs is produced from inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    name: String,
    inputs: Vec<PatternSpec>,
    outputs: Vec<PatternSpec>,
    priority: i64,
    rank: i32,
    code: Option<String>,
    version: Option<String>,
}

impl Rule {
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[PatternSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PatternSpec] {
        &self.outputs
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// blake3 digest of the rule's code text.
    pub fn code_fingerprint(&self) -> Option<String> {
        self.code.as_ref().map(|code| {
            let mut hasher = Hasher::new();
            hasher.update(code.as_bytes());
            hasher.finalize().to_hex().to_string()
        })
    }

    /// Wildcard names of the declared dynamic inputs.
    pub fn dynamic_input_wildcards(&self) -> BTreeSet<String> {
        self.inputs
            .iter()
            .filter(|spec| spec.is_dynamic())
            .flat_map(|spec| spec.pattern.wildcard_names())
            .collect()
    }

    /// Bind wildcards and produce the concrete inputs and outputs.
    pub fn instantiate(self: &Arc<Self>, wildcards: &Wildcards) -> std::result::Result<JobSpec, ResolveError> {
        let unbound = |name: String| ResolveError::InvalidRule {
            rule: self.name.clone(),
            reason: format!("wildcard '{name}' is not bound"),
        };

        let mut inputs: Vec<ArtifactRef> = Vec::with_capacity(self.inputs.len());
        for spec in &self.inputs {
            let artifact = spec.instantiate(wildcards).map_err(unbound)?;
            if !inputs.contains(&artifact) {
                inputs.push(artifact);
            }
        }

        let mut outputs: Vec<ArtifactRef> = Vec::with_capacity(self.outputs.len());
        for spec in &self.outputs {
            let artifact = spec.instantiate(wildcards).map_err(unbound)?;
            if !outputs.contains(&artifact) {
                outputs.push(artifact);
            }
        }

        Ok(JobSpec {
            rule: Arc::clone(self),
            wildcards: wildcards.clone(),
            inputs,
            outputs,
        })
    }

    /// Derive a concrete rule from realized dynamic wildcard values.
    ///
    /// Every dynamic spec on `side` that mentions a realized name is replaced
    /// by one plain spec per realized binding. Returns `None` when no spec on
    /// that side is affected.
    pub fn dynamic_branch(&self, realized: &[Wildcards], side: DynamicSide) -> Option<Rule> {
        let names: BTreeSet<&String> = realized.iter().flat_map(|w| w.keys()).collect();
        let specs = match side {
            DynamicSide::Output => &self.outputs,
            DynamicSide::Input => &self.inputs,
        };

        let mut changed = false;
        let mut branched = Vec::with_capacity(specs.len());
        for spec in specs {
            let affected = spec.is_dynamic()
                && spec
                    .pattern
                    .wildcard_names()
                    .iter()
                    .any(|name| names.contains(name));
            if !affected {
                branched.push(spec.clone());
                continue;
            }

            changed = true;
            let flags = ArtifactFlags {
                dynamic: false,
                ..spec.flags
            };
            let mut seen = BTreeSet::new();
            for binding in realized {
                let template = spec.pattern.partial_expand(binding);
                if !seen.insert(template.clone()) {
                    continue;
                }
                // Realized values come from listed paths and compile as
                // literals unless they contain braces.
                if let Ok(pattern) = Pattern::new(template) {
                    branched.push(PatternSpec::new(pattern, flags));
                }
            }
        }

        if !changed {
            return None;
        }

        let mut rule = self.clone();
        match side {
            DynamicSide::Output => rule.outputs = branched,
            DynamicSide::Input => rule.inputs = branched,
        }
        Some(rule)
    }
}

impl Producer for Rule {
    fn produces(&self, artifact: &ArtifactRef) -> Option<Wildcards> {
        let placeholder = artifact.is_placeholder();
        for spec in &self.outputs {
            if spec.is_dynamic() {
                // A dynamic output only stands in for its own placeholder.
                if !placeholder {
                    continue;
                }
                if let Some(mut wildcards) = spec.pattern.matches_placeholder(artifact.path()) {
                    wildcards.retain(|_, value| !is_placeholder_value(value));
                    return Some(wildcards);
                }
            } else if placeholder {
                if let Some(wildcards) = spec.pattern.matches_placeholder(artifact.path()) {
                    return Some(wildcards);
                }
            } else if let Some(wildcards) = spec.pattern.matches(artifact.path()) {
                return Some(wildcards);
            }
        }
        None
    }
}

impl Specificity for Rule {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn wildcard_count(&self) -> usize {
        self.outputs
            .iter()
            .flat_map(|spec| spec.pattern.wildcard_names())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

fn is_placeholder_value(value: &str) -> bool {
    value.starts_with('{') && value.ends_with('}')
}

/// Programmatic construction of a [`Rule`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    inputs: Vec<(String, ArtifactFlags)>,
    outputs: Vec<(String, ArtifactFlags)>,
    priority: i64,
    rank: i32,
    code: Option<String>,
    version: Option<String>,
}

impl RuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            priority: 0,
            rank: 0,
            code: None,
            version: None,
        }
    }

    pub fn input(mut self, pattern: impl Into<String>) -> Self {
        self.inputs.push((pattern.into(), ArtifactFlags::default()));
        self
    }

    /// An input standing for every realization of a dynamic output.
    pub fn dynamic_input(mut self, pattern: impl Into<String>) -> Self {
        self.inputs.push((
            pattern.into(),
            ArtifactFlags {
                dynamic: true,
                ..ArtifactFlags::default()
            },
        ));
        self
    }

    pub fn output(mut self, pattern: impl Into<String>) -> Self {
        self.outputs.push((pattern.into(), ArtifactFlags::default()));
        self
    }

    pub fn temp_output(mut self, pattern: impl Into<String>) -> Self {
        self.outputs.push((
            pattern.into(),
            ArtifactFlags {
                temporary: true,
                ..ArtifactFlags::default()
            },
        ));
        self
    }

    pub fn protected_output(mut self, pattern: impl Into<String>) -> Self {
        self.outputs.push((
            pattern.into(),
            ArtifactFlags {
                protected: true,
                ..ArtifactFlags::default()
            },
        ));
        self
    }

    pub fn dynamic_output(mut self, pattern: impl Into<String>) -> Self {
        self.outputs.push((
            pattern.into(),
            ArtifactFlags {
                dynamic: true,
                ..ArtifactFlags::default()
            },
        ));
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn specificity(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn build(self) -> Result<Rule> {
        let invalid = |reason: String| -> JobdagError {
            ResolveError::InvalidRule {
                rule: self.name.clone(),
                reason,
            }
            .into()
        };

        if self.name.trim().is_empty() {
            return Err(invalid("rule name must not be empty".to_string()));
        }

        let compile = |specs: &[(String, ArtifactFlags)]| -> Result<Vec<PatternSpec>> {
            specs
                .iter()
                .map(|(template, flags)| Ok(PatternSpec::new(Pattern::new(template.as_str())?, *flags)))
                .collect()
        };
        let inputs = compile(&self.inputs)?;
        let outputs = compile(&self.outputs)?;

        // Wildcards of plain inputs have to be determined by the outputs.
        let output_names: BTreeSet<String> = outputs
            .iter()
            .flat_map(|spec| spec.pattern.wildcard_names())
            .collect();
        for spec in inputs.iter().filter(|spec| !spec.is_dynamic()) {
            if let Some(name) = spec
                .pattern
                .wildcard_names()
                .into_iter()
                .find(|name| !output_names.contains(name))
            {
                return Err(invalid(format!(
                    "wildcard '{name}' in input '{}' does not appear in any output",
                    spec.pattern
                )));
            }
        }

        Ok(Rule {
            name: self.name,
            inputs,
            outputs,
            priority: self.priority,
            rank: self.rank,
            code: self.code,
            version: self.version,
        })
    }
}
