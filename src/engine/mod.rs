// src/engine/mod.rs

//! Driving a built scheduler to completion.
//!
//! The pure state machine lives in [`core`]: it consumes [`RuntimeEvent`]s,
//! calls into the scheduler and answers with commands. The async shell in
//! [`runtime`] reads events from a channel, waits for outputs to appear and
//! hands ready jobs to an [`ExecutorBackend`](crate::exec::ExecutorBackend).

use std::time::Duration;

use crate::dag::{ArtifactRef, Job, JobId};
use crate::rules::Wildcards;

/// What the executor reports for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed(String),
}

/// A ready job as handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub id: JobId,
    pub rule: String,
    pub wildcards: Wildcards,
    pub inputs: Vec<ArtifactRef>,
    pub outputs: Vec<ArtifactRef>,
    pub priority: i64,
}

impl From<&Job> for ScheduledJob {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id(),
            rule: job.rule_name().to_string(),
            wildcards: job.wildcards().clone(),
            inputs: job.inputs().to_vec(),
            outputs: job.outputs().to_vec(),
            priority: job.priority(),
        }
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Keep dispatching independent jobs after a failure.
    pub keep_going: bool,
    /// Upper bound on how long to wait for the outputs of a finished job.
    pub latency_wait: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            keep_going: false,
            latency_wait: Duration::from_secs(5),
        }
    }
}

/// Events flowing into the runtime from the executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A job's payload is done.
    JobCompleted { job: JobId, outcome: JobOutcome },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Finished jobs in completion order. Rewritten jobs appear under their
    /// replacement handle.
    pub finished: Vec<JobId>,
    pub failed: Vec<(JobId, String)>,
    /// Jobs that still needed to run when the runtime stopped.
    pub pending: usize,
    /// Whether the run stopped because shutdown was requested.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.pending == 0 && !self.interrupted
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
