// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::BTreeSet;

use tracing::{error, info, warn};

use crate::dag::{JobId, Scheduler};
use crate::engine::{JobOutcome, RunSummary, RuntimeOptions, ScheduledJob};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send these jobs to the executor.
    DispatchJobs(Vec<ScheduledJob>),
    /// Nothing is left to wait for.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Bookkeeping of the current run that the scheduler does not track.
#[derive(Debug, Default)]
pub struct Progress {
    pub running: BTreeSet<JobId>,
    pub summary: RunSummary,
    /// Set after a failure without `keep_going`: nothing new is dispatched.
    pub halted: bool,
}

/// Dispatch the initial frontier.
pub fn handle_start(scheduler: &mut Scheduler, progress: &mut Progress) -> CoreStep {
    let ready = scheduler.initial_frontier();
    info!(ready = ready.len(), "starting run");
    let commands = dispatch(scheduler, progress, ready);
    settle(scheduler, progress, commands)
}

/// Handle a job the executor reported as done.
///
/// On success the scheduler records provenance and finishes the job, which
/// may rewrite it and admit new jobs. On failure the job's outputs are
/// removed and it stays unfinished.
pub fn handle_job_completion(
    scheduler: &mut Scheduler,
    progress: &mut Progress,
    options: &RuntimeOptions,
    job: JobId,
    outcome: JobOutcome,
) -> CoreStep {
    if !progress.running.remove(&job) {
        warn!(job = %job, "completion for a job that is not running; ignoring");
        return settle(scheduler, progress, Vec::new());
    }

    let outcome = match outcome {
        JobOutcome::Success => complete(scheduler, job),
        JobOutcome::Failed(message) => Err(message),
    };

    let commands = match outcome {
        Ok((finished, newly_ready)) => {
            progress.summary.finished.push(finished);
            dispatch(scheduler, progress, newly_ready)
        }
        Err(message) => {
            error!(job = %job, error = %message, "job failed");
            if let Err(error) = scheduler.record_failure(job) {
                warn!(job = %job, error = %error, "cleanup after failure did not complete");
            }
            progress.summary.failed.push((job, message));
            if !options.keep_going {
                progress.halted = true;
            }
            Vec::new()
        }
    };
    settle(scheduler, progress, commands)
}

/// Stop dispatching and wait for nothing else.
pub fn handle_shutdown(scheduler: &Scheduler, progress: &mut Progress) -> CoreStep {
    info!(running = progress.running.len(), "shutdown requested");
    progress.summary.interrupted = true;
    progress.summary.pending = pending(scheduler);
    CoreStep {
        commands: Vec::new(),
        keep_running: false,
    }
}

/// Returns the handle the job finished under and the newly ready jobs.
fn complete(scheduler: &mut Scheduler, job: JobId) -> Result<(JobId, Vec<JobId>), String> {
    scheduler.record_success(job).map_err(|e| e.to_string())?;

    let before: BTreeSet<JobId> = scheduler.state().finished.clone();
    let newly_ready = scheduler.finish(job, true).map_err(|e| e.to_string())?;
    let finished = scheduler
        .state()
        .finished
        .difference(&before)
        .next()
        .copied()
        .unwrap_or(job);

    if finished != job {
        // Provenance for the concrete outputs of the rewritten job.
        if let Err(error) = scheduler.record_success(finished) {
            warn!(job = %finished, error = %error, "cannot record rewritten outputs");
        }
    }
    Ok((finished, newly_ready))
}

fn dispatch(scheduler: &mut Scheduler, progress: &mut Progress, ready: Vec<JobId>) -> Vec<CoreCommand> {
    if progress.halted {
        return Vec::new();
    }

    let mut jobs = Vec::with_capacity(ready.len());
    for id in ready {
        if progress.running.contains(&id) {
            continue;
        }
        if let Err(error) = scheduler.record_started(id) {
            warn!(job = %id, error = %error, "cannot mark outputs as incomplete");
        }
        let Some(job) = scheduler.job(id) else {
            continue;
        };
        jobs.push(ScheduledJob::from(job));
        progress.running.insert(id);
    }

    if jobs.is_empty() {
        Vec::new()
    } else {
        vec![CoreCommand::DispatchJobs(jobs)]
    }
}

/// Exit once nothing is running and nothing more will be dispatched.
fn settle(scheduler: &Scheduler, progress: &mut Progress, mut commands: Vec<CoreCommand>) -> CoreStep {
    let idle = progress.running.is_empty() && commands.is_empty();
    if !idle {
        return CoreStep {
            commands,
            keep_running: true,
        };
    }

    progress.summary.pending = pending(scheduler);
    if progress.summary.pending > 0 && progress.summary.failed.is_empty() {
        warn!(
            pending = progress.summary.pending,
            "no job is ready but some still need to run"
        );
    }
    commands.push(CoreCommand::RequestExit);
    CoreStep {
        commands,
        keep_running: false,
    }
}

fn pending(scheduler: &Scheduler) -> usize {
    scheduler
        .needrun_jobs()
        .filter(|job| !scheduler.is_finished(job.id()))
        .count()
}
