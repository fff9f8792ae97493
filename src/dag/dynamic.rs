// src/dag/dynamic.rs

//! Splicing concrete jobs in place of dynamic placeholders.
//!
//! A job declaring a dynamic output such as `chunk_{i}.txt` only learns the
//! values of `i` after it ran. Once they are known, the job is replaced by a
//! concrete variant, and consumers that declared a matching dynamic input are
//! replaced by variants listing every realized artifact.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::artifact::ArtifactRef;
use crate::dag::graph::Direction;
use crate::dag::job::{JobId, JobSpec};
use crate::dag::scheduler::Scheduler;
use crate::errors::{JobdagError, Result};
use crate::rules::{DynamicSide, Pattern, Wildcards};
use crate::store::ArtifactStore;

/// Bindings of the placeholder's wildcards for every stored artifact that
/// matches it.
pub(crate) fn realized_wildcards(store: &dyn ArtifactStore, placeholder: &ArtifactRef) -> Vec<Wildcards> {
    let pattern = match Pattern::new(placeholder.path()) {
        Ok(pattern) => pattern,
        Err(error) => {
            warn!(artifact = %placeholder, error = %error, "placeholder is not a valid pattern");
            return Vec::new();
        }
    };
    match store.list(pattern.constant_prefix()) {
        Ok(paths) => paths.iter().filter_map(|path| pattern.matches(path)).collect(),
        Err(error) => {
            warn!(artifact = %placeholder, error = %error, "cannot list realizations");
            Vec::new()
        }
    }
}

impl Scheduler {
    /// Replace a job with dynamic outputs by its concrete form.
    ///
    /// Returns `None` when nothing was realized yet. Otherwise returns the
    /// replacement; unfinished consumers with matching dynamic inputs are
    /// replaced as well, except those still waiting for another rewrite.
    pub fn rewrite(&mut self, job: JobId) -> Result<Option<JobId>> {
        let current = self.graph.job(job).ok_or(JobdagError::JobNotFound(job))?;

        let mut realized: Vec<Wildcards> = Vec::new();
        for placeholder in current.dynamic_outputs() {
            for binding in realized_wildcards(&*self.store, placeholder) {
                if !realized.contains(&binding) {
                    realized.push(binding);
                }
            }
        }
        if realized.is_empty() {
            debug!(job = %current, "no dynamic output realized");
            return Ok(None);
        }

        let rule = Arc::clone(current.rule());
        let wildcards = current.wildcards().clone();
        let Some(branched) = rule.dynamic_branch(&realized, DynamicSide::Output) else {
            return Ok(None);
        };

        let depending: Vec<JobId> = self
            .graph
            .bfs(Direction::Dependents, [job], |id| {
                id != job && self.state.is_finished(id)
            })
            .into_iter()
            .filter(|id| *id != job)
            .collect();

        let specialized = self.catalog.specialize(rule.name(), branched);
        let spec = specialized.instantiate(&wildcards)?;
        let replacement = self.replace_job(job, spec, false, &BTreeSet::new())?;
        info!(
            rule = %rule.name(),
            old = %job,
            new = %replacement,
            realized = realized.len(),
            "rewrote dynamic job"
        );

        let names: BTreeSet<&String> = realized.iter().flat_map(|w| w.keys()).collect();
        let keep = BTreeSet::from([replacement]);

        for dependent in depending {
            // An earlier replacement may already have pruned it.
            let Some(consumer) = self.graph.job(dependent) else {
                continue;
            };
            let consumer_rule = Arc::clone(consumer.rule());
            let affected = consumer_rule
                .dynamic_input_wildcards()
                .iter()
                .any(|name| names.contains(name));
            if !affected {
                continue;
            }
            let Some(branched) = consumer_rule.dynamic_branch(&realized, DynamicSide::Input) else {
                continue;
            };
            if self.state.dynamic.contains(&dependent) {
                debug!(job = %consumer, "consumer still waits for another rewrite");
                continue;
            }

            let existing: Vec<&ArtifactRef> = consumer
                .outputs()
                .iter()
                .filter(|o| !o.is_placeholder() && self.store.exists(o))
                .collect();
            if !existing.is_empty() {
                warn!(
                    job = %consumer,
                    outputs = ?existing,
                    "outputs of a dynamic consumer already exist and will be rebuilt"
                );
            }

            let consumer_wildcards = consumer.wildcards().clone();
            let specialized = self.catalog.specialize(consumer_rule.name(), branched);
            let spec = specialized.instantiate(&consumer_wildcards)?;
            let new = self.replace_job(dependent, spec, true, &keep)?;
            info!(
                rule = %consumer_rule.name(),
                old = %dependent,
                new = %new,
                "rewrote consumer of dynamic output"
            );
        }

        self.new_wildcards.insert(replacement, realized);
        Ok(Some(replacement))
    }

    /// Delete `old` and resolve `spec` in its place.
    ///
    /// The replacement takes over finished and target state plus the old
    /// reason, and every edge towards a consumer of `old` that still exists.
    pub(super) fn replace_job(
        &mut self,
        old: JobId,
        spec: JobSpec,
        recursive: bool,
        keep: &BTreeSet<JobId>,
    ) -> Result<JobId> {
        let was_finished = self.state.is_finished(old);
        let was_target = self.graph.is_target(old);
        let reason = self.state.reason(old).cloned();
        let consumers = self.graph.dependents_of(old).clone();

        self.remove_jobs(old, recursive, keep);
        let new = self.resolver().resolve_spec(spec)?;

        if was_target {
            self.graph.add_target(new);
        }
        if was_finished {
            self.state.finished.insert(new);
        }
        if let Some(reason) = reason {
            if !reason.is_empty() {
                self.state.needrun.insert(new);
            }
            self.state.reasons.insert(new, reason);
        }

        for (consumer, artifacts) in consumers {
            if !self.graph.contains(consumer) {
                continue;
            }
            for artifact in artifacts {
                self.graph.add_edge(new, consumer, artifact);
            }
        }
        Ok(new)
    }
}
