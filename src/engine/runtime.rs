// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::dag::{JobId, Scheduler};
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, JobOutcome, RunSummary, RuntimeEvent, ScheduledJob};

const FIRST_OUTPUT_POLL: Duration = Duration::from_millis(10);
const MAX_OUTPUT_POLL: Duration = Duration::from_secs(1);

/// Drives a built scheduler in response to `RuntimeEvent`s and delegates
/// job execution to an `ExecutorBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains all the runtime
/// semantics. The shell reads events, waits for the outputs of successful
/// jobs to appear and dispatches ready jobs.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the initial frontier.
    /// - Consumes `RuntimeEvent`s from `event_rx` until the core has nothing
    ///   left to wait for.
    /// - Returns the scheduler together with the run summary.
    pub async fn run(mut self) -> Result<(Scheduler, RunSummary)> {
        info!("jobdag runtime started");

        let mut step = self.core.start();
        loop {
            for command in step.commands {
                self.execute_command(command).await?;
            }
            if !step.keep_running {
                break;
            }

            let event = match self.event_rx.recv().await {
                Some(event) => event,
                None => {
                    warn!(running = self.core.running(), "runtime event channel closed; exiting");
                    break;
                }
            };
            debug!(?event, "runtime received event");

            let event = match event {
                RuntimeEvent::JobCompleted {
                    job,
                    outcome: JobOutcome::Success,
                } => RuntimeEvent::JobCompleted {
                    job,
                    outcome: self.wait_for_outputs(job).await,
                },
                other => other,
            };
            step = self.core.step(event);
        }

        let (scheduler, summary) = self.core.into_parts();
        info!(
            finished = summary.finished.len(),
            failed = summary.failed.len(),
            pending = summary.pending,
            "runtime exiting"
        );
        Ok((scheduler, summary))
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchJobs(jobs) => self.spawn_ready(jobs).await,
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
                Ok(())
            }
        }
    }

    async fn spawn_ready(&mut self, jobs: Vec<ScheduledJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = jobs.iter().map(|j| j.id.to_string()).collect();
        debug!(?ids, "spawning ready jobs");
        self.executor.spawn_ready_jobs(jobs).await
    }

    /// Poll the outputs of a job reported successful, backing off
    /// exponentially until `latency_wait` is used up.
    async fn wait_for_outputs(&self, job: JobId) -> JobOutcome {
        let deadline = Instant::now() + self.core.options().latency_wait;
        let mut delay = FIRST_OUTPUT_POLL;

        loop {
            let error = match self.core.scheduler().check_outputs(job) {
                Ok(()) => return JobOutcome::Success,
                Err(error) => error,
            };
            let now = Instant::now();
            if now >= deadline {
                return JobOutcome::Failed(error.to_string());
            }
            debug!(job = %job, error = %error, "outputs not there yet; waiting");
            sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(MAX_OUTPUT_POLL);
        }
    }
}
