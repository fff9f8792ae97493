// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from channels, waiting for outputs to appear and sending
//! [`ScheduledJob`](crate::engine::ScheduledJob)s to the executor.
//!
//! The core can be unit tested without Tokio, channels or a real executor.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    CoreStep, Progress, handle_job_completion, handle_shutdown, handle_start,
};
use crate::engine::{RunSummary, RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// This owns the built scheduler, the set of running jobs and the summary
/// collected so far. It has no channels and performs no waiting; the only
/// re-entry point into the scheduler is [`step`](Self::step).
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    progress: Progress,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RuntimeOptions) -> Self {
        Self {
            scheduler,
            progress: Progress::default(),
            options,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Number of jobs handed to the executor and not yet reported back.
    pub fn running(&self) -> usize {
        self.progress.running.len()
    }

    /// Dispatch the initial frontier.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler, &mut self.progress)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobCompleted { job, outcome } => handle_job_completion(
                &mut self.scheduler,
                &mut self.progress,
                &self.options,
                job,
                outcome,
            ),
            RuntimeEvent::ShutdownRequested => handle_shutdown(&self.scheduler, &mut self.progress),
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.progress.summary
    }

    /// Hand back the scheduler, e.g. to inspect the final graph.
    pub fn into_parts(self) -> (Scheduler, RunSummary) {
        (self.scheduler, self.progress.summary)
    }
}
