// src/lib.rs

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod persistence;
pub mod rules;
pub mod store;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::dag::{Scheduler, SchedulerOptions, Target};
use crate::engine::{CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::persistence::Persistence;
use crate::rules::Catalog;
use crate::store::ArtifactStore;

impl From<&ConfigFile> for RuntimeOptions {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            keep_going: cfg.config.keep_going,
            latency_wait: cfg.latency_wait(),
        }
    }
}

/// High-level entry point.
///
/// This wires together:
/// - logging at `[config].log_level`, unless a subscriber is already set
/// - scheduler options from the validated config
/// - graph construction for `targets`
/// - the core runtime and its async shell
/// - the executor, built from the runtime's event sender
/// - Ctrl-C handling
pub async fn run<C, P, E, F>(
    cfg: &ConfigFile,
    catalog: C,
    store: Arc<dyn ArtifactStore>,
    persistence: P,
    targets: &[Target],
    make_executor: F,
) -> Result<RunSummary>
where
    C: Catalog + 'static,
    P: Persistence + 'static,
    E: ExecutorBackend,
    F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
{
    if let Err(e) = logging::init_logging(cfg.config.log_level) {
        debug!(error = %e, "keeping the existing tracing subscriber");
    }

    let options = SchedulerOptions::from_config(cfg)?;
    let mut scheduler = Scheduler::new(catalog, store, persistence, options);
    scheduler.build(targets)?;
    info!(
        needrun = scheduler.needrun_jobs().count(),
        "graph ready; starting execution"
    );

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = make_executor(rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        let _ = rt_tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let core = CoreRuntime::new(scheduler, RuntimeOptions::from(cfg));
    let runtime = Runtime::new(core, rt_rx, executor);
    let (_scheduler, summary) = runtime.run().await?;
    Ok(summary)
}
