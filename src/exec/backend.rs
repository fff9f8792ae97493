// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of running payloads
//! itself. Whatever runs the job reports back with
//! [`RuntimeEvent::JobCompleted`](crate::engine::RuntimeEvent::JobCompleted).
//!
//! - `ChannelExecutorBackend` forwards scheduled jobs over an mpsc channel to
//!   an external runner.
//! - Tests can provide their own `ExecutorBackend` that, for example, writes
//!   outputs into an in-memory store and directly emits completion events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::ScheduledJob;
use crate::errors::{Error, Result};

/// Trait abstracting how scheduled jobs are executed.
pub trait ExecutorBackend: Send {
    /// Hand the given jobs over for execution.
    ///
    /// Jobs arrive highest priority first. The implementation may run them
    /// in parallel; it must report each one exactly once.
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Forwards jobs to an external runner holding the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelExecutorBackend {
    tx: mpsc::Sender<ScheduledJob>,
}

impl ChannelExecutorBackend {
    pub fn new(tx: mpsc::Sender<ScheduledJob>) -> Self {
        Self { tx }
    }
}

impl ExecutorBackend for ChannelExecutorBackend {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(job).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
