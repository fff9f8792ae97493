// src/dag/reason.rs

use std::collections::BTreeSet;
use std::fmt;

use crate::dag::artifact::ArtifactRef;

/// Why a job has to run. A job is need-run exactly when its reason is not
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reason {
    /// Forced by configuration or by an incomplete earlier run.
    pub forced: bool,
    /// Requested target without inputs or outputs.
    pub noio: bool,
    /// Requested target with inputs but no outputs.
    pub nooutput: bool,
    pub missing_output: BTreeSet<ArtifactRef>,
    /// Inputs newer than the oldest output.
    pub updated_input: BTreeSet<ArtifactRef>,
    /// Inputs that a need-run dependency will regenerate.
    pub updated_input_run: BTreeSet<ArtifactRef>,
    pub code_changed: BTreeSet<ArtifactRef>,
    pub version_changed: BTreeSet<ArtifactRef>,
    /// The job had no reason of its own and inherited one through an edge.
    pub derived: bool,
}

impl Reason {
    /// `derived` is a marker about the other fields and does not count.
    pub fn is_empty(&self) -> bool {
        !self.forced
            && !self.noio
            && !self.nooutput
            && self.missing_output.is_empty()
            && self.updated_input.is_empty()
            && self.updated_input_run.is_empty()
            && self.code_changed.is_empty()
            && self.version_changed.is_empty()
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(set: &BTreeSet<ArtifactRef>) -> String {
            set.iter()
                .map(|a| a.path())
                .collect::<Vec<_>>()
                .join(", ")
        }

        let mut parts = Vec::new();
        if self.forced {
            parts.push("forced".to_string());
        }
        if self.noio {
            parts.push("rule has neither input nor output".to_string());
        }
        if self.nooutput {
            parts.push("rule has no output".to_string());
        }
        if !self.missing_output.is_empty() {
            parts.push(format!("missing output: {}", list(&self.missing_output)));
        }
        if !self.updated_input.is_empty() {
            parts.push(format!("updated input: {}", list(&self.updated_input)));
        }
        if !self.updated_input_run.is_empty() {
            parts.push(format!(
                "input will be updated: {}",
                list(&self.updated_input_run)
            ));
        }
        if !self.code_changed.is_empty() {
            parts.push(format!("code changed: {}", list(&self.code_changed)));
        }
        if !self.version_changed.is_empty() {
            parts.push(format!("version changed: {}", list(&self.version_changed)));
        }

        if parts.is_empty() {
            f.write_str("up to date")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}
